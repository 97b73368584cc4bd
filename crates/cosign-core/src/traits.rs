use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// External document-generation step (LLM or otherwise).
///
/// Calls are blocking and may fail for any transient or permanent reason;
/// callers run them on the generation worker pool, never on the event loop.
pub trait DocumentGenerator: Send + Sync + 'static {
    /// Produce the agreement text for `request`.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "generator"
    }
}

/// Notification dispatcher: delivers a document to one party.
pub trait Notifier: Send + Sync + 'static {
    /// Returns `Ok(true)` when the delivery was accepted, `Ok(false)` when it was refused.
    fn send(&self, delivery: &Delivery) -> BoxFuture<'_, Result<bool>>;
}

/// Persistence collaborator consumed by the lifecycle coordinator.
pub trait AgreementStore: Send + Sync + 'static {
    /// Allocate a new agreement row in `PROCESSING` and return its id.
    fn create_agreement(
        &self,
        kind: AgreementKind,
        requested_by: &str,
        summary: &str,
    ) -> BoxFuture<'_, Result<AgreementId>>;

    fn update_agreement_status(
        &self,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<()>>;

    /// Create a status row for `party_id` unless one already exists.
    /// Returns true if a row was written.
    fn create_party_status(
        &self,
        party_id: &PartyId,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Store the final signed document and mark the agreement approved.
    fn store_final_document(
        &self,
        id: AgreementId,
        kind: AgreementKind,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, Result<()>>;

    fn agreement_status(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Option<AgreementStatus>>>;

    fn party_statuses(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Vec<PartyStatusRow>>>;
}
