//! Canonical records shared by the parser, the orchestrator and the stores.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Delivery status after synonym normalization.
///
/// Labels that are not in the fixed table are kept verbatim (uppercased)
/// in `Other`, so new template values never reject a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delayed,
    InProgress,
    Completed,
    NotStarted,
    Paused,
    Other(String),
}

impl DeliveryStatus {
    /// Uppercase the raw label and map it through the synonym table.
    pub fn from_label(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "ATRASADA" => Self::Delayed,
            "EM ANDAMENTO" => Self::InProgress,
            "CONCLUÍDA" | "CONCLUIDA" => Self::Completed,
            "NÃO INICIADA" | "NAO INICIADA" => Self::NotStarted,
            "PAUSADA" => Self::Paused,
            _ => Self::Other(upper),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Delayed => "ATRASADA",
            Self::InProgress => "EM ANDAMENTO",
            Self::Completed => "CONCLUÍDA",
            Self::NotStarted => "NÃO INICIADA",
            Self::Paused => "PAUSADA",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One normalized delivery row, ready to be linked to an import and stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDelivery {
    pub meta_code: Option<String>,
    /// Always present and non-blank; rows without it are never emitted.
    pub delivery_code: String,
    pub description: Option<String>,
    pub indicator: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<DeliveryStatus>,
    pub superintendency: Option<String>,
    pub sector: Option<String>,
    pub contact: Option<String>,
    pub updated_by: Option<String>,
    /// 0-100 scale, two decimals.
    pub execution_percent: Option<f64>,
}

/// Month/year a submission refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferencePeriod {
    pub month: u32,
    pub year: i32,
}

impl ReferencePeriod {
    pub fn new(month: u32, year: i32) -> Self {
        Self { month, year }
    }

    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
    }
}

impl fmt::Display for ReferencePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// Metadata of one secretariat/month/year submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub secretariat_id: Uuid,
    pub period: ReferencePeriod,
    pub source_file_name: String,
    pub total_delivery_count: usize,
    pub imported_by: String,
}

/// Foreign keys attached to every delivery before insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryKeys {
    pub import_id: Uuid,
    pub secretariat_id: Uuid,
    pub period: ReferencePeriod,
}
