//! In-process row store for local development and tests.

use crate::error::{Error, Result};
use crate::store::{Row, SheetStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Parsed A1 range such as `Waitlist!A:E` or `Stats!A2:C2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub first_row: usize,
    pub last_row: Option<usize>,
    pub first_col: usize,
    pub last_col: Option<usize>,
}

impl A1Range {
    pub fn parse(range: &str) -> Result<Self> {
        let (sheet, cells) = match range.rsplit_once('!') {
            Some((sheet, cells)) => (sheet, Some(cells)),
            None => (range, None),
        };
        let sheet = sheet.trim_matches('\'');
        if sheet.is_empty() {
            return Err(Error::StoreFormat(format!("Invalid range {:?}", range)));
        }

        let mut parsed = A1Range {
            sheet: sheet.to_string(),
            first_row: 1,
            last_row: None,
            first_col: 0,
            last_col: None,
        };

        if let Some(cells) = cells {
            let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
            let (first_col, first_row) = parse_cell(start)
                .ok_or_else(|| Error::StoreFormat(format!("Invalid range {:?}", range)))?;
            let (last_col, last_row) = parse_cell(end)
                .ok_or_else(|| Error::StoreFormat(format!("Invalid range {:?}", range)))?;
            parsed.first_col = first_col.unwrap_or(0);
            parsed.last_col = last_col;
            parsed.first_row = first_row.unwrap_or(1);
            parsed.last_row = last_row;
        }

        Ok(parsed)
    }

    fn select(&self, rows: &[Row]) -> Vec<Row> {
        let end = self.last_row.unwrap_or(rows.len()).min(rows.len());
        let start = (self.first_row - 1).min(end);

        rows[start..end]
            .iter()
            .map(|row| {
                let last = self.last_col.map(|c| c + 1).unwrap_or(row.len()).min(row.len());
                let first = self.first_col.min(last);
                row[first..last].to_vec()
            })
            .collect()
    }
}

/// Split `B12` into (column index, row number); either part may be absent.
fn parse_cell(cell: &str) -> Option<(Option<usize>, Option<usize>)> {
    let split = cell.find(|c: char| c.is_ascii_digit()).unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);

    if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let col = if letters.is_empty() {
        None
    } else {
        let index = letters
            .to_ascii_uppercase()
            .bytes()
            .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
        Some(index - 1)
    };

    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<usize>() {
            Ok(row) if row > 0 => Some(row),
            _ => return None,
        }
    };

    Some((col, row))
}

#[derive(Default)]
pub struct MemorySheets {
    sheets: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create sheets that start with a single title row each
    pub fn with_headers(sheets: &[(&str, &[&str])]) -> Self {
        let store = Self::new();
        for (name, titles) in sheets {
            store.set_rows(name, vec![titles.iter().map(|t| t.to_string()).collect()]);
        }
        store
    }

    pub fn set_rows(&self, sheet: &str, rows: Vec<Row>) {
        self.sheets.write().insert(sheet.to_string(), rows);
    }

    pub fn rows(&self, sheet: &str) -> Vec<Row> {
        self.sheets.read().get(sheet).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SheetStore for MemorySheets {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>> {
        let range = A1Range::parse(range)?;
        let sheets = self.sheets.read();
        Ok(sheets
            .get(&range.sheet)
            .map(|rows| range.select(rows))
            .unwrap_or_default())
    }

    async fn append_row(&self, range: &str, row: Row) -> Result<()> {
        let range = A1Range::parse(range)?;
        self.sheets.write().entry(range.sheet).or_default().push(row);
        Ok(())
    }
}
