//! Spreadsheet reading and header-row detection.
//!
//! A sheet is first read with no header assumption into a [`RawTable`].
//! The header row is then located by scanning for the IDM/ENTREGA labels,
//! and the table is re-cut with that row as column labels.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::debug;

/// Tokens that identify the header row of a delivery sheet
const HEADER_TOKENS: &[&str] = &["IDM", "ENTREGA"];

/// Header index used when no row carries a header token
const FALLBACK_HEADER_ROW: usize = 1;

pub type Cell = Option<String>;

/// Sheet contents as untyped cells, no header assumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    rows: Vec<Vec<Cell>>,
}

/// Sheet contents re-cut around a header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a table from string literals; empty strings become absent cells.
    pub fn from_strings(rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            None
                        } else {
                            Some(cell.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Use row `header_idx` as column labels and the rows below it as data.
    /// Rows with nothing but blank cells are dropped.
    pub fn with_header(&self, header_idx: usize) -> HeaderedTable {
        let Some(header) = self.rows.get(header_idx) else {
            return HeaderedTable::default();
        };

        let columns = header
            .iter()
            .map(|cell| cell.as_deref().unwrap_or("").trim().to_string())
            .collect();

        let rows = self.rows[header_idx + 1..]
            .iter()
            .filter(|row| !is_blank_row(row))
            .cloned()
            .collect();

        HeaderedTable { columns, rows }
    }
}

impl HeaderedTable {
    /// Cell at `col` of `row`, absent when the row is shorter than the header.
    pub fn cell<'a>(&self, row: &'a [Cell], col: usize) -> Option<&'a str> {
        row.get(col).and_then(|c| c.as_deref())
    }
}

fn is_blank_row(row: &[Cell]) -> bool {
    row.iter()
        .all(|cell| cell.as_deref().map_or(true, |s| s.trim().is_empty()))
}

/// First row containing a header token, or the second row when none does.
pub fn locate_header_row(table: &RawTable) -> usize {
    table
        .rows()
        .iter()
        .position(|row| {
            row.iter().flatten().any(|cell| {
                HEADER_TOKENS
                    .iter()
                    .any(|token| cell.contains(token))
            })
        })
        .unwrap_or(FALLBACK_HEADER_ROW)
}

/// Render a calamine cell the way it reads on screen.
pub fn cell_to_text(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(ndt) if ndt.time() == chrono::NaiveTime::MIN => {
                ndt.format("%Y-%m-%d").to_string()
            }
            Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        }),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

/// Read one sheet of a workbook (xls, xlsx, xlsb, ods) into a [`RawTable`].
///
/// Picks `sheet` when given, otherwise the first sheet. Blank rows above the
/// used range are kept so row indices match the sheet.
pub fn read_raw_table(path: &Path, sheet: Option<&str>) -> Result<(String, RawTable)> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.as_str() == name)
            .cloned()
            .with_context(|| format!("sheet \"{}\" not found", name))?,
        None => sheet_names
            .first()
            .cloned()
            .context("Workbook has no sheets")?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet \"{}\"", sheet_name))?;

    let leading_rows = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); leading_rows];
    rows.extend(
        range
            .rows()
            .map(|row| row.iter().map(cell_to_text).collect::<Vec<_>>()),
    );

    let (row_count, col_count) = range.get_size();
    debug!(sheet = %sheet_name, rows = row_count, cols = col_count, "sheet loaded");

    Ok((sheet_name, RawTable::new(rows)))
}
