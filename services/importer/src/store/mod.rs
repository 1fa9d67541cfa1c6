//! Record store seam. The orchestrator only ever talks to this trait.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{CanonicalDelivery, DeliveryKeys, ImportRecord, ReferencePeriod};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Backing store for secretariats, imports and their deliveries.
///
/// Every call is one request/response. `begin`/`commit`/`rollback` bracket
/// the replace-deliveries sequence; stores without transactions keep the
/// default no-ops and accept the partial-write window.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_secretariat_by_code(&self, code: &str) -> Result<Option<Uuid>>;

    async fn find_import(&self, secretariat_id: Uuid, period: ReferencePeriod) -> Result<Option<Uuid>>;

    async fn insert_import(&self, record: &ImportRecord) -> Result<Uuid>;

    async fn update_import(&self, import_id: Uuid, record: &ImportRecord) -> Result<()>;

    async fn delete_deliveries_by_import(&self, import_id: Uuid) -> Result<()>;

    /// Must leave the unit of work usable when it fails.
    async fn insert_delivery(&self, keys: &DeliveryKeys, delivery: &CanonicalDelivery) -> Result<()>;

    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}
