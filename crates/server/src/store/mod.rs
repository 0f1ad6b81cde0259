//! Spreadsheet-backed row storage
//!
//! The waitlist lives in a spreadsheet used as an ad-hoc database. Everything
//! above this module sees it only as rows addressed by A1 range strings.

pub mod google;
pub mod memory;

pub use google::GoogleSheets;
pub use memory::MemorySheets;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Rows at the top of the waitlist range that are column titles, not signups
pub const HEADER_ROWS: usize = 1;

pub type Row = Vec<String>;

/// Opaque row store accessed by range string
#[async_trait]
pub trait SheetStore: Send + Sync + 'static {
    /// Fails with a configuration error when the store cannot be reached at
    /// all. Checked before any network access.
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Row>>;

    async fn append_row(&self, range: &str, row: Row) -> Result<()>;
}

/// Signups in a range holding `rows` populated rows, header excluded.
///
/// Clamped at zero so a range configured without its header row never
/// reports a negative count.
pub fn signups_from_rows(rows: usize) -> u64 {
    rows.saturating_sub(HEADER_ROWS) as u64
}

/// Reads the current signup count. Never cached: every call re-reads the
/// store so writes from any path are observed.
#[derive(Clone)]
pub struct CountStore {
    sheets: Arc<dyn SheetStore>,
    range: String,
}

impl CountStore {
    pub fn new(sheets: Arc<dyn SheetStore>, range: impl Into<String>) -> Self {
        Self {
            sheets,
            range: range.into(),
        }
    }

    pub fn ensure_configured(&self) -> Result<()> {
        self.sheets.ensure_configured()
    }

    /// An empty sheet is a valid "0 signups" state, not an error.
    pub async fn fetch_count(&self) -> Result<u64> {
        self.sheets.ensure_configured()?;
        let rows = self.sheets.read_range(&self.range).await?;
        let populated = rows
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .count();
        let count = signups_from_rows(populated);
        debug!("[CountStore] {} rows in {} -> count {}", populated, self.range, count);
        Ok(count)
    }
}
