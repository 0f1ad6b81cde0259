use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{extract::State, Json};
use serde::Serialize;
use tracing::debug;

/// Landing-page progress figures kept in the stats sheet
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStats {
    pub development_progress: String,
    pub target_launch: String,
    pub timestamp: String,
}

/// GET /api/sheets
///
/// Columns of the stats row: timestamp, development progress, target launch.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<DisplayStats>> {
    state.sheets.ensure_configured()?;
    let rows = state.sheets.read_range(&state.config.stats_range).await?;

    let Some(row) = rows.into_iter().next() else {
        debug!("[Stats] No data in {}", state.config.stats_range);
        return Err(Error::NotFound("No data found in the spreadsheet".to_string()));
    };

    let mut cells = row.into_iter();
    let timestamp = cells.next().unwrap_or_default();
    let development_progress = cells.next().unwrap_or_default();
    let target_launch = cells.next().unwrap_or_default();

    Ok(Json(DisplayStats {
        development_progress,
        target_launch,
        timestamp,
    }))
}
