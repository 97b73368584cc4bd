use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use cosign_core::config::{AppConfig, ApprovalSourceKind};
use cosign_core::error::{CosignError, Result};
use cosign_core::event::BroadcastHub;
use cosign_core::traits::{AgreementStore, DocumentGenerator, Notifier};
use cosign_core::types::{
    AgreementId, AgreementKind, AgreementStatus, ApprovalOutcome, ContactDetails, Delivery,
    GenerationInput, PartyId, PartyRole, RentalTerms, TemplateTerms,
};

use crate::generation::GenerationOrchestrator;
use crate::listener::ApprovalListener;
use crate::record::{AgreementForm, Party};
use crate::registry::{lock, SharedRecord, StateRegistry};
use crate::source::ApprovalFeed;

const TEMPLATE_FILE: &str = "template.txt";

/// What a caller asks the coordinator to produce.
#[derive(Debug, Clone)]
pub enum AgreementRequest {
    Direct(RentalTerms),
    Template {
        terms: TemplateTerms,
        template_text: String,
    },
}

impl AgreementRequest {
    pub fn kind(&self) -> AgreementKind {
        match self {
            Self::Direct(_) => AgreementKind::Direct,
            Self::Template { .. } => AgreementKind::Template,
        }
    }

    /// One-line description stored alongside the agreement row.
    pub fn summary(&self) -> String {
        match self {
            Self::Direct(terms) => format!(
                "Rental of {}, {} ({} tenant(s))",
                terms.property_address,
                terms.city,
                terms.tenant_details.len()
            ),
            Self::Template { terms, .. } => terms.user_prompt.chars().take(120).collect(),
        }
    }
}

/// Terminal result of one lifecycle run.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    pub agreement_id: AgreementId,
    pub status: AgreementStatus,
    pub message: String,
}

impl LifecycleReport {
    fn new(agreement_id: AgreementId, status: AgreementStatus) -> Self {
        let message = match status {
            AgreementStatus::Approved => "Final signed agreement sent to all parties!",
            AgreementStatus::Rejected => "Agreement was rejected by one or more parties.",
            AgreementStatus::Expired => {
                "Agreement approval process timed out. No response received within the time limit."
            }
            AgreementStatus::Failed => "Agreement process failed due to connection issues.",
            AgreementStatus::Processing => "Agreement is being processed.",
        };
        Self {
            agreement_id,
            status,
            message: message.to_string(),
        }
    }
}

/// Sequences one agreement from generation to its final persisted status.
pub struct LifecycleCoordinator {
    registry: Arc<StateRegistry>,
    orchestrator: GenerationOrchestrator,
    listener: ApprovalListener,
    feed: ApprovalFeed,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn AgreementStore>,
    hub: Arc<BroadcastHub>,
    temp_root: PathBuf,
    in_flight: Mutex<HashSet<AgreementId>>,
}

/// Releases everything a run owns, on every exit path including cancellation.
struct LifecycleGuard<'a> {
    coordinator: &'a LifecycleCoordinator,
    agreement_id: AgreementId,
}

impl Drop for LifecycleGuard<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.coordinator.registry.remove(self.agreement_id) {
            lock(&record).remove_temp_files();
        }
        lock(&self.coordinator.in_flight).remove(&self.agreement_id);
        info!(agreement_id = %self.agreement_id, "Agreement state cleaned up");
    }
}

impl LifecycleCoordinator {
    pub fn new(
        config: &AppConfig,
        generator: Arc<dyn DocumentGenerator>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn AgreementStore>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        let feed = match (&config.approval.source, &config.approval.websocket_url) {
            (ApprovalSourceKind::Websocket, Some(url)) => ApprovalFeed::Remote { url: url.clone() },
            _ => ApprovalFeed::Local(hub.clone()),
        };
        Self {
            registry: Arc::new(StateRegistry::new()),
            orchestrator: GenerationOrchestrator::new(generator, &config.generation),
            listener: ApprovalListener::new(config.approval.timeout()),
            feed,
            notifier,
            store,
            hub,
            temp_root: config.temp_root(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Override where approval frames come from.
    pub fn with_feed(mut self, feed: ApprovalFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn registry(&self) -> &Arc<StateRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn AgreementStore> {
        &self.store
    }

    pub fn is_running(&self, agreement_id: AgreementId) -> bool {
        lock(&self.in_flight).contains(&agreement_id)
    }

    /// Allocate a new agreement and run it to completion.
    pub async fn submit(
        &self,
        request: AgreementRequest,
        requested_by: &str,
    ) -> Result<LifecycleReport> {
        let agreement_id = self
            .store
            .create_agreement(request.kind(), requested_by, &request.summary())
            .await?;
        info!(
            agreement_id = %agreement_id,
            kind = %request.kind(),
            requested_by,
            "Agreement submitted"
        );
        self.run(agreement_id, request).await
    }

    /// Run the full lifecycle for `agreement_id`.
    ///
    /// Protocol outcomes (rejection, expiry, closed channel) come back as a
    /// report. Generation, dispatch and persistence failures are persisted as
    /// `FAILED` and returned as errors. Temp files and the registry entry are
    /// released on every path.
    pub async fn run(
        &self,
        agreement_id: AgreementId,
        request: AgreementRequest,
    ) -> Result<LifecycleReport> {
        let kind = request.kind();
        if !lock(&self.in_flight).insert(agreement_id) {
            return Err(CosignError::AlreadyRunning(agreement_id.to_string()));
        }
        let _guard = LifecycleGuard {
            coordinator: self,
            agreement_id,
        };

        match self.drive(agreement_id, request).await {
            Ok(report) => {
                info!(
                    agreement_id = %agreement_id,
                    status = %report.status,
                    "Agreement lifecycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(agreement_id = %agreement_id, error = %e, "Agreement lifecycle failed");
                self.persist_failure(agreement_id, kind).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        agreement_id: AgreementId,
        request: AgreementRequest,
    ) -> Result<LifecycleReport> {
        let kind = request.kind();
        let record = self.registry.get_or_create(agreement_id);
        self.initialise(&record, request).await?;
        self.store
            .update_agreement_status(agreement_id, AgreementStatus::Processing, kind)
            .await?;

        let input = self.generation_input(&record).await?;
        self.orchestrator.generate(&record, input.clone()).await?;

        // Subscribe before anyone can vote.
        let mut source = match self.feed.open().await {
            Ok(source) => source,
            Err(e) => {
                warn!(agreement_id = %agreement_id, error = %e, "Could not open approval channel");
                return self.finish_unsuccessful(&record, ApprovalOutcome::ConnectionClosed).await;
            }
        };

        self.dispatch_initial(&record).await?;

        let outcome = self.listener.listen(&record, source.as_mut()).await;
        drop(source);
        info!(agreement_id = %agreement_id, outcome = %outcome, "Approval finished");

        match outcome {
            ApprovalOutcome::Approved => self.finish_approved(&record, input).await,
            other => self.finish_unsuccessful(&record, other).await,
        }
    }

    async fn initialise(&self, record: &SharedRecord, request: AgreementRequest) -> Result<()> {
        let (agreement_id, temp_dir) = {
            let r = lock(record);
            (r.agreement_id, self.temp_root.join(r.agreement_id.to_string()))
        };

        let (form, parties, template_path) = match request {
            AgreementRequest::Direct(terms) => {
                let parties = rental_parties(&terms)?;
                (AgreementForm::Direct(terms), parties, None)
            }
            AgreementRequest::Template {
                terms,
                template_text,
            } => {
                let parties = template_parties(&terms)?;
                if template_text.trim().is_empty() {
                    return Err(CosignError::InvalidRequest("template text is empty".into()));
                }
                let template_path = temp_dir.join(TEMPLATE_FILE);
                tokio::fs::create_dir_all(&temp_dir).await?;
                tokio::fs::write(&template_path, template_text).await?;
                (
                    AgreementForm::Template {
                        terms,
                        template_path: template_path.clone(),
                    },
                    parties,
                    Some(template_path),
                )
            }
        };

        // Uploads land here and never create it themselves.
        tokio::fs::create_dir_all(&temp_dir).await?;

        let mut r = lock(record);
        r.temp_dir = Some(temp_dir);
        if let Some(path) = template_path {
            r.track_temp_file(path);
        }
        r.form = Some(form);
        r.parties = parties;
        info!(
            agreement_id = %agreement_id,
            kind = %r.kind(),
            parties = r.parties.len(),
            "Agreement record initialised"
        );
        Ok(())
    }

    async fn generation_input(&self, record: &SharedRecord) -> Result<GenerationInput> {
        let form = lock(record).form.clone();
        match form {
            Some(AgreementForm::Direct(terms)) => Ok(GenerationInput::Rental(terms)),
            Some(AgreementForm::Template {
                terms,
                template_path,
            }) => {
                let template_text = tokio::fs::read_to_string(&template_path).await?;
                Ok(GenerationInput::Template {
                    prompt: terms.user_prompt,
                    template_text,
                })
            }
            None => Err(CosignError::InvalidRequest("agreement record has no terms".into())),
        }
    }

    fn deliveries(&self, record: &SharedRecord, is_final: bool) -> Result<Vec<Delivery>> {
        let r = lock(record);
        let document_path = r.document_path.clone().ok_or_else(|| {
            CosignError::Render(format!("agreement {} has no rendered document", r.agreement_id))
        })?;
        Ok(r.parties
            .iter()
            .map(|p| Delivery {
                email: p.email.clone(),
                display_name: p.display_name.clone(),
                document_path: document_path.clone(),
                role: p.role,
                role_label: p.role_label.clone(),
                party_id: p.id.clone(),
                agreement_id: r.agreement_id,
                kind: r.kind(),
                is_final,
            })
            .collect())
    }

    /// Send the draft to every party. Any refused delivery aborts the run.
    async fn dispatch_initial(&self, record: &SharedRecord) -> Result<()> {
        for delivery in self.deliveries(record, false)? {
            match self.notifier.send(&delivery).await {
                Ok(true) => info!(
                    agreement_id = %delivery.agreement_id,
                    party_id = %delivery.party_id,
                    role = %delivery.role_label,
                    "Agreement sent for approval"
                ),
                Ok(false) => {
                    return Err(CosignError::Dispatch {
                        recipient: delivery.email,
                    })
                }
                Err(e) => {
                    warn!(
                        agreement_id = %delivery.agreement_id,
                        recipient = %delivery.email,
                        error = %e,
                        "Delivery failed"
                    );
                    return Err(CosignError::Dispatch {
                        recipient: delivery.email,
                    });
                }
            }
        }
        Ok(())
    }

    async fn finish_approved(
        &self,
        record: &SharedRecord,
        input: GenerationInput,
    ) -> Result<LifecycleReport> {
        let (agreement_id, kind) = {
            let mut r = lock(record);
            r.approve_all();
            (r.agreement_id, r.kind())
        };

        let final_path = self.orchestrator.generate(record, input).await?;

        // The agreement is settled; a failed copy does not undo it.
        for delivery in self.deliveries(record, true)? {
            match self.notifier.send(&delivery).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    agreement_id = %agreement_id,
                    recipient = %delivery.email,
                    "Final agreement delivery refused"
                ),
                Err(e) => warn!(
                    agreement_id = %agreement_id,
                    recipient = %delivery.email,
                    error = %e,
                    "Final agreement delivery failed"
                ),
            }
        }

        let bytes = tokio::fs::read(&final_path).await?;
        self.store
            .store_final_document(agreement_id, kind, bytes)
            .await?;
        self.record_party_statuses(record, AgreementStatus::Approved)
            .await?;
        Ok(LifecycleReport::new(agreement_id, AgreementStatus::Approved))
    }

    async fn finish_unsuccessful(
        &self,
        record: &SharedRecord,
        outcome: ApprovalOutcome,
    ) -> Result<LifecycleReport> {
        let (agreement_id, kind) = {
            let r = lock(record);
            (r.agreement_id, r.kind())
        };
        let status = outcome.status();
        self.store
            .update_agreement_status(agreement_id, status, kind)
            .await?;
        self.record_party_statuses(record, status).await?;
        Ok(LifecycleReport::new(agreement_id, status))
    }

    async fn record_party_statuses(
        &self,
        record: &SharedRecord,
        status: AgreementStatus,
    ) -> Result<()> {
        let (agreement_id, kind, party_ids) = party_snapshot(record);
        for party_id in party_ids {
            let created = self
                .store
                .create_party_status(&party_id, agreement_id, status, kind)
                .await?;
            if created {
                self.hub.publish_json(&serde_json::json!({
                    "userId": party_id,
                    "status": status,
                }));
            }
        }
        Ok(())
    }

    /// Best effort: a failing store must not mask the original error.
    async fn persist_failure(&self, agreement_id: AgreementId, kind: AgreementKind) {
        if let Err(e) = self
            .store
            .update_agreement_status(agreement_id, AgreementStatus::Failed, kind)
            .await
        {
            warn!(agreement_id = %agreement_id, error = %e, "Could not persist FAILED status");
        }
        let Some(record) = self.registry.get(agreement_id) else {
            return;
        };
        if let Err(e) = self
            .record_party_statuses(&record, AgreementStatus::Failed)
            .await
        {
            warn!(agreement_id = %agreement_id, error = %e, "Could not persist party FAILED status");
        }
    }
}

fn party_snapshot(record: &SharedRecord) -> (AgreementId, AgreementKind, Vec<PartyId>) {
    let r = lock(record);
    (
        r.agreement_id,
        r.kind(),
        r.parties.iter().map(|p| p.id.clone()).collect(),
    )
}

fn require_email(email: &str, who: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(CosignError::InvalidRequest(format!("{} email is required", who)));
    }
    Ok(())
}

fn rental_parties(terms: &RentalTerms) -> Result<Vec<Party>> {
    require_email(&terms.owner_email, "owner")?;
    if terms.tenant_details.is_empty() {
        return Err(CosignError::InvalidRequest("at least one tenant is required".into()));
    }

    let owner = ContactDetails {
        name: terms.owner_name.clone(),
        email: terms.owner_email.clone(),
    };
    let mut parties = vec![Party::new(PartyRole::Authority, "OWNER", "Owner", &owner)];
    let numbered = terms.tenant_details.len() > 1;
    for (i, tenant) in terms.tenant_details.iter().enumerate() {
        require_email(&tenant.email, "tenant")?;
        let label = if numbered {
            format!("Tenant {}", i + 1)
        } else {
            "Tenant".to_string()
        };
        parties.push(Party::new(
            PartyRole::Participant,
            &format!("TENANT_{}", i + 1),
            &label,
            tenant,
        ));
    }
    Ok(parties)
}

fn template_parties(terms: &TemplateTerms) -> Result<Vec<Party>> {
    require_email(&terms.authority_email, "authority")?;
    require_email(&terms.participant_email, "participant")?;
    if terms.user_prompt.trim().is_empty() {
        return Err(CosignError::InvalidRequest("prompt is empty".into()));
    }
    let authority = ContactDetails {
        name: terms
            .authority_name
            .clone()
            .unwrap_or_else(|| "Authority".to_string()),
        email: terms.authority_email.clone(),
    };
    let participant = ContactDetails {
        name: terms
            .participant_name
            .clone()
            .unwrap_or_else(|| "Participant".to_string()),
        email: terms.participant_email.clone(),
    };
    Ok(vec![
        Party::new(PartyRole::Authority, "AUTHORITY", "Authority", &authority),
        Party::new(PartyRole::Participant, "PARTICIPANT", "Participant", &participant),
    ])
}
