//! Import orchestration: one workbook in, one upserted import out.
//!
//! Steps for a single file:
//! 1. Resolve secretariat code and reference period, look the secretariat up
//! 2. Extract and normalize the deliveries from the sheet
//! 3. Upsert the import for (secretariat, month, year); on reimport wipe
//!    its deliveries
//! 4. Insert every delivery on its own; failures are counted, not fatal
//!
//! Steps 3-4 run inside the store's unit of work. Every error is turned
//! into a failed [`ImportOutcome`] at the per-file boundary.

use crate::config::DEFAULT_MAX_FILE_BYTES;
use crate::error::ImportError;
use crate::files::list_spreadsheets;
use crate::filename::{period_from_file_name, secretariat_code_from_file_name};
use crate::models::{CanonicalDelivery, DeliveryKeys, ImportRecord, ReferencePeriod};
use crate::normalize::normalize_rows;
use crate::store::RecordStore;
use crate::workbook::{locate_header_row, read_raw_table};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub max_file_bytes: u64,
    /// Fixed "today" for period fallback; `None` reads the local clock
    pub reference_date: Option<NaiveDate>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            reference_date: None,
        }
    }
}

/// Caller-supplied overrides for one file. Missing values come from the
/// file name.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub secretariat_code: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub sheet: Option<String>,
    pub imported_by: String,
}

impl ImportRequest {
    pub fn by(user: &str) -> Self {
        Self {
            imported_by: user.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub import_id: Uuid,
    pub secretariat_code: String,
    /// MM/YYYY
    pub period: String,
    pub total_records: usize,
    pub inserted_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub success: bool,
    #[serde(flatten)]
    pub summary: Option<ImportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ImportOutcome {
    pub fn imported(summary: ImportSummary) -> Self {
        Self {
            success: true,
            summary: Some(summary),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: None,
            error_message: Some(message.into()),
        }
    }
}

/// One entry of a directory import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Progress of a single-file import, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Start,
    SecretariatResolved,
    DataExtracted,
    ImportUpserted,
    DeliveriesWritten,
}

/// Read a workbook and return its normalized deliveries.
pub fn extract_deliveries(path: &Path, sheet: Option<&str>) -> Result<Vec<CanonicalDelivery>> {
    let (sheet_name, raw) = read_raw_table(path, sheet)?;
    let header_row = locate_header_row(&raw);
    let table = raw.with_header(header_row);
    debug!(
        sheet = %sheet_name,
        header_row,
        columns = ?table.columns,
        "header located"
    );

    let deliveries = normalize_rows(&table);
    info!(
        sheet = %sheet_name,
        rows = table.rows.len(),
        deliveries = deliveries.len(),
        "sheet normalized"
    );
    Ok(deliveries)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

pub struct Importer<S> {
    store: S,
    settings: ImportSettings,
}

impl<S: RecordStore> Importer<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, ImportSettings::default())
    }

    pub fn with_settings(store: S, settings: ImportSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn today(&self) -> NaiveDate {
        self.settings
            .reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Explicit month/year win; if either is missing both are derived from
    /// the file name and only the gaps are filled.
    pub fn resolve_period(&self, file_name: &str, request: &ImportRequest) -> ReferencePeriod {
        match (request.month, request.year) {
            (Some(month), Some(year)) => ReferencePeriod::new(month, year),
            (month, year) => {
                let derived = period_from_file_name(file_name, self.today());
                ReferencePeriod::new(month.unwrap_or(derived.month), year.unwrap_or(derived.year))
            }
        }
    }

    /// Import one workbook. Never fails: errors become a failed outcome.
    pub async fn import_file(&self, path: &Path, request: &ImportRequest) -> ImportOutcome {
        let mut stage = ImportStage::Start;
        match self.run(path, request, &mut stage).await {
            Ok(summary) => {
                info!(
                    file = %path.display(),
                    import_id = %summary.import_id,
                    secretariat = %summary.secretariat_code,
                    period = %summary.period,
                    inserted = summary.inserted_count,
                    failed = summary.failed_count,
                    "import finished"
                );
                ImportOutcome::imported(summary)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(file = %path.display(), stage = ?stage, error = %message, "import failed");
                ImportOutcome::failed(message)
            }
        }
    }

    /// Import every spreadsheet in `dir`, one after another, in name order.
    /// A failing file is recorded and the batch moves on.
    pub async fn import_directory(&self, dir: &Path, imported_by: &str) -> Result<Vec<FileOutcome>> {
        let files = list_spreadsheets(dir).await?;
        info!(dir = %dir.display(), files = files.len(), "batch import started");

        let request = ImportRequest::by(imported_by);
        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let file_name = display_name(&path);
            info!(file = %file_name, "importing");
            let outcome = self.import_file(&path, &request).await;
            results.push(FileOutcome { file_name, outcome });
        }
        Ok(results)
    }

    async fn run(
        &self,
        path: &Path,
        request: &ImportRequest,
        stage: &mut ImportStage,
    ) -> Result<ImportSummary, ImportError> {
        let file_name = display_name(path);

        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
            .len();
        if size > self.settings.max_file_bytes {
            return Err(ImportError::FileTooLarge {
                size,
                limit: self.settings.max_file_bytes,
            });
        }

        let code = request
            .secretariat_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| secretariat_code_from_file_name(&file_name));
        let period = self.resolve_period(&file_name, request);
        if !period.is_valid() {
            return Err(ImportError::InvalidPeriod(period.month));
        }

        let secretariat_id = self
            .store
            .find_secretariat_by_code(&code)
            .await?
            .ok_or_else(|| ImportError::SecretariatNotFound(code.clone()))?;
        *stage = ImportStage::SecretariatResolved;
        debug!(secretariat = %code, %secretariat_id, %period, "secretariat resolved");

        let deliveries = extract_deliveries(path, request.sheet.as_deref())?;
        if deliveries.is_empty() {
            return Err(ImportError::NoData);
        }
        *stage = ImportStage::DataExtracted;

        let record = ImportRecord {
            secretariat_id,
            period,
            source_file_name: file_name,
            total_delivery_count: deliveries.len(),
            imported_by: request.imported_by.clone(),
        };

        self.store.begin().await?;
        let written = match self.write(&record, &deliveries, stage).await {
            Ok(written) => self.store.commit().await.map(|_| written),
            Err(e) => Err(e),
        };
        let (import_id, inserted_count, failed_count) = match written {
            Ok(written) => written,
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    warn!(error = %format!("{:#}", rollback_err), "rollback failed");
                }
                return Err(e.into());
            }
        };

        Ok(ImportSummary {
            import_id,
            secretariat_code: code,
            period: period.to_string(),
            total_records: deliveries.len(),
            inserted_count,
            failed_count,
        })
    }

    /// Upsert the import, then replace its deliveries.
    async fn write(
        &self,
        record: &ImportRecord,
        deliveries: &[CanonicalDelivery],
        stage: &mut ImportStage,
    ) -> Result<(Uuid, usize, usize)> {
        let import_id = match self
            .store
            .find_import(record.secretariat_id, record.period)
            .await?
        {
            Some(existing) => {
                self.store.update_import(existing, record).await?;
                self.store.delete_deliveries_by_import(existing).await?;
                info!(%existing, period = %record.period, "replacing previous import");
                existing
            }
            None => self.store.insert_import(record).await?,
        };
        *stage = ImportStage::ImportUpserted;

        let keys = DeliveryKeys {
            import_id,
            secretariat_id: record.secretariat_id,
            period: record.period,
        };

        let mut inserted = 0;
        let mut failed = 0;
        for delivery in deliveries {
            match self.store.insert_delivery(&keys, delivery).await {
                Ok(()) => inserted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        delivery = %delivery.delivery_code,
                        error = %format!("{:#}", e),
                        "delivery insert failed"
                    );
                }
            }
        }
        *stage = ImportStage::DeliveriesWritten;

        Ok((import_id, inserted, failed))
    }
}
