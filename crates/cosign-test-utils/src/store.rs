use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use cosign_core::error::{CosignError, Result};
use cosign_core::traits::AgreementStore;
use cosign_core::types::{AgreementId, AgreementKind, AgreementStatus, PartyId, PartyStatusRow};

#[derive(Default)]
struct Inner {
    next_id: i64,
    last_id: Option<AgreementId>,
    statuses: HashMap<(AgreementKind, AgreementId), Vec<AgreementStatus>>,
    parties: HashMap<(AgreementKind, AgreementId), Vec<PartyStatusRow>>,
    documents: HashMap<AgreementId, Vec<u8>>,
}

/// In-memory `AgreementStore` that keeps the full status history.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest persisted status.
    pub fn status(&self, id: AgreementId, kind: AgreementKind) -> Option<AgreementStatus> {
        self.history(id, kind).last().copied()
    }

    pub fn history(&self, id: AgreementId, kind: AgreementKind) -> Vec<AgreementStatus> {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .get(&(kind, id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn party_rows(&self, id: AgreementId, kind: AgreementKind) -> Vec<PartyStatusRow> {
        self.inner
            .lock()
            .unwrap()
            .parties
            .get(&(kind, id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn final_document(&self, id: AgreementId) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().documents.get(&id).cloned()
    }

    /// Id handed out by the most recent `create_agreement`.
    pub fn last_id(&self) -> Option<AgreementId> {
        self.inner.lock().unwrap().last_id
    }

    fn push_status(&self, id: AgreementId, kind: AgreementKind, status: AgreementStatus) {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .entry((kind, id))
            .or_default()
            .push(status);
    }
}

impl AgreementStore for MemoryStore {
    fn create_agreement(
        &self,
        kind: AgreementKind,
        _requested_by: &str,
        _summary: &str,
    ) -> BoxFuture<'_, Result<AgreementId>> {
        Box::pin(async move {
            let id = {
                let mut inner = self.inner.lock().unwrap();
                inner.next_id += 1;
                let id = AgreementId(inner.next_id);
                inner.last_id = Some(id);
                id
            };
            self.push_status(id, kind, AgreementStatus::Processing);
            Ok(id)
        })
    }

    fn update_agreement_status(
        &self,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.push_status(id, kind, status);
            Ok(())
        })
    }

    fn create_party_status(
        &self,
        party_id: &PartyId,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<bool>> {
        let party_id = party_id.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let rows = inner.parties.entry((kind, id)).or_default();
            if rows.iter().any(|r| r.party_id == party_id) {
                return Ok(false);
            }
            rows.push(PartyStatusRow {
                party_id,
                agreement_id: id,
                status,
                created_at: chrono::Utc::now().to_rfc3339(),
            });
            Ok(true)
        })
    }

    fn store_final_document(
        &self,
        id: AgreementId,
        kind: AgreementKind,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if bytes.is_empty() {
                return Err(CosignError::Database("empty final document".into()));
            }
            self.inner.lock().unwrap().documents.insert(id, bytes);
            self.push_status(id, kind, AgreementStatus::Approved);
            Ok(())
        })
    }

    fn agreement_status(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Option<AgreementStatus>>> {
        Box::pin(async move { Ok(self.status(id, kind)) })
    }

    fn party_statuses(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Vec<PartyStatusRow>>> {
        Box::pin(async move { Ok(self.party_rows(id, kind)) })
    }
}
