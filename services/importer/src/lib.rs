//! Monthly delivery spreadsheet importer.
//!
//! Secretariats submit one workbook per month. Each workbook is read with
//! an auto-detected header row, its columns are mapped by label onto the
//! canonical delivery record, and the result replaces whatever was
//! previously imported for the same secretariat/month/year.

pub mod columns;
pub mod config;
pub mod error;
pub mod files;
pub mod filename;
pub mod importer;
pub mod models;
pub mod normalize;
pub mod store;
pub mod workbook;

pub use error::{FieldParseError, ImportError};
pub use importer::{
    extract_deliveries, FileOutcome, ImportOutcome, ImportRequest, ImportSettings, ImportSummary,
    Importer,
};
pub use models::{CanonicalDelivery, DeliveryStatus, ReferencePeriod};
pub use store::{MemoryStore, PgStore, RecordStore};
