//! Secretariat code and reference period derived from a file name,
//! e.g. `SESAU_AGOSTO_2024_SC.xlsx`.

use crate::models::ReferencePeriod;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Secretariat code used when the file name has no `CODE_` prefix
pub const UNKNOWN_SECRETARIAT: &str = "DESCONHECIDO";

/// Searched in this order; MARÇO and MARCO both map to March
const MONTH_NAMES: &[(&str, u32)] = &[
    ("JANEIRO", 1),
    ("FEVEREIRO", 2),
    ("MARÇO", 3),
    ("MARCO", 3),
    ("ABRIL", 4),
    ("MAIO", 5),
    ("JUNHO", 6),
    ("JULHO", 7),
    ("AGOSTO", 8),
    ("SETEMBRO", 9),
    ("OUTUBRO", 10),
    ("NOVEMBRO", 11),
    ("DEZEMBRO", 12),
];

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d{2}").expect("valid year regex"));

fn bare_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
}

/// Uppercased text before the first underscore of the file stem.
pub fn secretariat_code_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    match stem.split_once('_') {
        Some((prefix, _)) if !prefix.trim().is_empty() => prefix.trim().to_uppercase(),
        _ => UNKNOWN_SECRETARIAT.to_string(),
    }
}

/// Month number from a Portuguese month name anywhere in the name.
pub fn month_from_file_name(file_name: &str) -> Option<u32> {
    let upper = bare_name(file_name).to_uppercase();
    MONTH_NAMES
        .iter()
        .find(|(name, _)| upper.contains(name))
        .map(|(_, number)| *number)
}

/// First `20XX` token in the name.
pub fn year_from_file_name(file_name: &str) -> Option<i32> {
    YEAR_RE
        .find(bare_name(file_name))
        .and_then(|m| m.as_str().parse().ok())
}

/// Month and year from the name; each falls back to `today` on its own.
pub fn period_from_file_name(file_name: &str, today: NaiveDate) -> ReferencePeriod {
    ReferencePeriod {
        month: month_from_file_name(file_name).unwrap_or_else(|| today.month()),
        year: year_from_file_name(file_name).unwrap_or_else(|| today.year()),
    }
}
