use super::RecordStore;
use crate::models::{CanonicalDelivery, DeliveryKeys, ImportRecord, ReferencePeriod};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImport {
    pub id: Uuid,
    pub record: ImportRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDelivery {
    pub keys: DeliveryKeys,
    pub delivery: CanonicalDelivery,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    secretariats: HashMap<String, Uuid>,
    imports: Vec<StoredImport>,
    deliveries: Vec<StoredDelivery>,
}

/// In-process store for dry runs and tests.
///
/// `begin` snapshots the state and `rollback` restores it, so it follows
/// the same unit-of-work contract as [`super::PgStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    snapshot: Mutex<Option<MemoryState>>,
    /// Register unknown secretariat codes on lookup instead of missing them
    permissive: bool,
    failing_codes: Mutex<HashSet<String>>,
    fail_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that resolves every secretariat code (used by `--dry-run`).
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn with_secretariat(self, code: &str) -> Self {
        self.lock_state()
            .secretariats
            .insert(code.to_string(), Uuid::new_v4());
        self
    }

    /// Make `insert_delivery` fail for this delivery code.
    pub fn fail_delivery(&self, code: &str) {
        self.failing_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string());
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn secretariat_id(&self, code: &str) -> Option<Uuid> {
        self.lock_state().secretariats.get(code).copied()
    }

    pub fn imports(&self) -> Vec<StoredImport> {
        self.lock_state().imports.clone()
    }

    pub fn deliveries(&self) -> Vec<StoredDelivery> {
        self.lock_state().deliveries.clone()
    }

    pub fn deliveries_for(&self, import_id: Uuid) -> Vec<CanonicalDelivery> {
        self.lock_state()
            .deliveries
            .iter()
            .filter(|d| d.keys.import_id == import_id)
            .map(|d| d.delivery.clone())
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Option<MemoryState>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_secretariat_by_code(&self, code: &str) -> Result<Option<Uuid>> {
        let mut state = self.lock_state();
        if let Some(id) = state.secretariats.get(code) {
            return Ok(Some(*id));
        }
        if !self.permissive {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        state.secretariats.insert(code.to_string(), id);
        Ok(Some(id))
    }

    async fn find_import(&self, secretariat_id: Uuid, period: ReferencePeriod) -> Result<Option<Uuid>> {
        Ok(self
            .lock_state()
            .imports
            .iter()
            .find(|i| i.record.secretariat_id == secretariat_id && i.record.period == period)
            .map(|i| i.id))
    }

    async fn insert_import(&self, record: &ImportRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.lock_state().imports.push(StoredImport {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn update_import(&self, import_id: Uuid, record: &ImportRecord) -> Result<()> {
        let mut state = self.lock_state();
        match state.imports.iter_mut().find(|i| i.id == import_id) {
            Some(existing) => {
                existing.record = record.clone();
                Ok(())
            }
            None => bail!("import {} does not exist", import_id),
        }
    }

    async fn delete_deliveries_by_import(&self, import_id: Uuid) -> Result<()> {
        self.lock_state()
            .deliveries
            .retain(|d| d.keys.import_id != import_id);
        Ok(())
    }

    async fn insert_delivery(&self, keys: &DeliveryKeys, delivery: &CanonicalDelivery) -> Result<()> {
        let failing = self
            .failing_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&delivery.delivery_code);
        if failing {
            bail!("insert rejected for delivery {}", delivery.delivery_code);
        }

        self.lock_state().deliveries.push(StoredDelivery {
            keys: *keys,
            delivery: delivery.clone(),
        });
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        let current = self.lock_state().clone();
        *self.lock_snapshot() = Some(current);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            bail!("commit failed");
        }
        self.lock_snapshot().take();
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if let Some(saved) = self.lock_snapshot().take() {
            *self.lock_state() = saved;
        }
        Ok(())
    }
}
