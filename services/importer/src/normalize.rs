//! Row normalization: raw cells -> [`CanonicalDelivery`].
//!
//! Field parsers return `Result`; the normalizer maps failures to the
//! per-field fallback (0 for percent, absent for dates) and never drops a
//! row for a bad value. Only a blank IDE drops a row.

use crate::columns::{CanonicalField, ColumnMap};
use crate::error::FieldParseError;
use crate::models::{CanonicalDelivery, DeliveryStatus};
use crate::workbook::HeaderedTable;
use chrono::{NaiveDate, NaiveDateTime};

/// Slash, dash and dot layouts are tried month-first, then day-first, so
/// `05/08/2024` is May 8 and `15/08/2024` is August 15.
// Two-digit year goes before %Y, which would read "24" as year 0024
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%d/%m/%y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m.%d.%Y",
    "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Parse a percent cell, ignoring any `%` sign and surrounding whitespace.
pub fn parse_percent(raw: &str) -> Result<f64, FieldParseError> {
    let cleaned = raw.replace('%', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(FieldParseError::Empty);
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(FieldParseError::Number(raw.to_string())),
    }
}

/// Values above 1 are already on the 0-100 scale; 1 and below are fractions.
pub fn scale_percent(value: f64) -> f64 {
    let scaled = if value > 1.0 { value } else { value * 100.0 };
    round2(scaled)
}

/// Percent with the unparsable-means-zero fallback.
pub fn normalize_percent(raw: &str) -> f64 {
    parse_percent(raw).map(scale_percent).unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Permissive date parsing: ISO first, then month-first before day-first.
pub fn parse_date(raw: &str) -> Result<NaiveDate, FieldParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(FieldParseError::Empty);
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
        .ok_or_else(|| FieldParseError::Date(raw.to_string()))
}

/// Normalize every data row that carries a delivery code, in sheet order.
pub fn normalize_rows(table: &HeaderedTable) -> Vec<CanonicalDelivery> {
    let map = ColumnMap::from_headers(&table.columns);
    let Some(code_col) = map.column(CanonicalField::DeliveryCode) else {
        return Vec::new();
    };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let code = table.cell(row, code_col)?.trim();
            if code.is_empty() {
                return None;
            }

            let mut delivery = CanonicalDelivery {
                delivery_code: code.to_string(),
                ..Default::default()
            };

            for (field, col) in map.fields() {
                if let Some(value) = table.cell(row, col) {
                    apply_field(&mut delivery, field, value.trim());
                }
            }

            if let Some(col) = map.percent_column() {
                delivery.execution_percent = table.cell(row, col).map(normalize_percent);
            }

            Some(delivery)
        })
        .collect()
}

fn apply_field(delivery: &mut CanonicalDelivery, field: CanonicalField, value: &str) {
    let text = || Some(value.to_string());
    match field {
        CanonicalField::MetaCode => delivery.meta_code = text(),
        CanonicalField::DeliveryCode => {}
        CanonicalField::Description => delivery.description = text(),
        CanonicalField::Indicator => delivery.indicator = text(),
        CanonicalField::StartDate => delivery.start_date = parse_date(value).ok(),
        CanonicalField::EndDate => delivery.end_date = parse_date(value).ok(),
        CanonicalField::Status => delivery.status = Some(DeliveryStatus::from_label(value)),
        CanonicalField::Superintendency => delivery.superintendency = text(),
        CanonicalField::Sector => delivery.sector = text(),
        CanonicalField::Contact => delivery.contact = text(),
        CanonicalField::UpdatedBy => delivery.updated_by = text(),
    }
}
