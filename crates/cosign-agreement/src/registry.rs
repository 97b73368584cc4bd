use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cosign_core::types::AgreementId;

use crate::record::AgreementRecord;

/// A record shared between the coordinator, listener, and upload handlers.
pub type SharedRecord = Arc<Mutex<AgreementRecord>>;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide map from agreement id to its record.
///
/// Not persisted and not transactional. Callers serialize lifecycle runs per key.
pub struct StateRegistry {
    records: Mutex<HashMap<AgreementId, SharedRecord>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Return the record for `id`, creating an empty one on first access.
    pub fn get_or_create(&self, id: AgreementId) -> SharedRecord {
        lock(&self.records)
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(AgreementRecord::new(id))))
            .clone()
    }

    pub fn get(&self, id: AgreementId) -> Option<SharedRecord> {
        lock(&self.records).get(&id).cloned()
    }

    /// Remove and return the record. Absent ids are a no-op.
    pub fn remove(&self, id: AgreementId) -> Option<SharedRecord> {
        lock(&self.records).remove(&id)
    }

    pub fn contains(&self, id: AgreementId) -> bool {
        lock(&self.records).contains_key(&id)
    }

    /// Find the record owning `party_id`.
    pub fn find_party(&self, party_id: &str) -> Option<(AgreementId, SharedRecord)> {
        let records = lock(&self.records);
        records
            .iter()
            .find(|(_, record)| lock(record).has_party(party_id))
            .map(|(id, record)| (*id, record.clone()))
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
