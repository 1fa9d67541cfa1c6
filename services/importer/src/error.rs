use thiserror::Error;

/// Failure of a single-file import. Rendered into the failed outcome's
/// `errorMessage`, never propagated past the per-file boundary.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("secretariat {0} not found")]
    SecretariatNotFound(String),

    #[error("no data found in spreadsheet")]
    NoData,

    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("invalid reference month {0}")]
    InvalidPeriod(u32),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Why a raw cell could not be read as a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldParseError {
    #[error("empty value")]
    Empty,

    #[error("not a number: {0:?}")]
    Number(String),

    #[error("not a date: {0:?}")]
    Date(String),
}
