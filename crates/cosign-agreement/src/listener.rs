use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use cosign_core::types::{ApprovalMessage, ApprovalOutcome};

use crate::record::VoteEffect;
use crate::registry::{lock, SharedRecord};
use crate::source::ApprovalSource;

/// Classification of one raw channel frame.
#[derive(Debug)]
enum Frame {
    Vote(ApprovalMessage),
    /// Valid JSON, but not a vote.
    Other,
    Malformed(serde_json::Error),
}

fn classify(text: &str) -> Frame {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Frame::Malformed(e),
    };
    match serde_json::from_value::<ApprovalMessage>(value) {
        Ok(msg) => Frame::Vote(msg),
        Err(_) => Frame::Other,
    }
}

/// Waits for the parties of one agreement to settle it.
///
/// Unanimous approval or any single rejection ends the run. A single overall
/// deadline, armed when listening starts, bounds the wait.
pub struct ApprovalListener {
    timeout: Duration,
}

impl ApprovalListener {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Consume frames from `source` until the record reaches a terminal outcome.
    pub async fn listen(
        &self,
        record: &SharedRecord,
        source: &mut dyn ApprovalSource,
    ) -> ApprovalOutcome {
        let agreement_id = lock(record).agreement_id;
        let deadline = Instant::now() + self.timeout;
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        info!(
            agreement_id = %agreement_id,
            timeout_secs = self.timeout.as_secs_f64(),
            "Listening for approvals"
        );

        loop {
            let frame = tokio::select! {
                _ = &mut expiry => {
                    info!(agreement_id = %agreement_id, "Approval window expired");
                    return ApprovalOutcome::Expired;
                }
                frame = source.next_frame() => frame,
            };

            let text = match frame {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    warn!(agreement_id = %agreement_id, error = %e, "Approval channel failed");
                    return ApprovalOutcome::ConnectionClosed;
                }
                None => {
                    warn!(agreement_id = %agreement_id, "Approval channel closed");
                    return ApprovalOutcome::ConnectionClosed;
                }
            };

            let message = match classify(&text) {
                Frame::Vote(message) => message,
                Frame::Other => {
                    debug!(agreement_id = %agreement_id, "Ignoring non-vote frame");
                    continue;
                }
                Frame::Malformed(e) => {
                    warn!(agreement_id = %agreement_id, error = %e, "Invalid JSON on approval channel");
                    continue;
                }
            };

            let effect = lock(record).cast_vote(&message.user_id, message.approved);
            match effect {
                VoteEffect::UnknownParty => {
                    debug!(agreement_id = %agreement_id, "Vote for another agreement");
                }
                VoteEffect::Ignored => {
                    debug!(
                        agreement_id = %agreement_id,
                        party_id = %message.user_id,
                        "Vote after rejection dropped"
                    );
                }
                VoteEffect::Rejected => {
                    info!(agreement_id = %agreement_id, party_id = %message.user_id, "Party rejected");
                    return ApprovalOutcome::Rejected;
                }
                VoteEffect::Approved { fully_approved } => {
                    info!(agreement_id = %agreement_id, party_id = %message.user_id, "Party approved");
                    if fully_approved {
                        info!(agreement_id = %agreement_id, "All parties approved");
                        return ApprovalOutcome::Approved;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cosign_core::error::{CosignError, Result};
    use cosign_core::event::BroadcastHub;
    use cosign_core::types::{AgreementId, ContactDetails, PartyRole, Vote};
    use tokio::sync::mpsc;

    use super::*;
    use crate::record::{AgreementRecord, Party};
    use crate::source::HubSource;

    fn contact(name: &str) -> ContactDetails {
        ContactDetails {
            name: name.into(),
            email: format!("{}@example.com", name),
        }
    }

    /// Record with an owner "A" and a tenant "B".
    fn owner_tenant_record(id: i64) -> SharedRecord {
        let mut record = AgreementRecord::new(AgreementId(id));
        let mut owner = Party::new(PartyRole::Authority, "OWNER", "Owner", &contact("a"));
        owner.id.0 = "A".into();
        let mut tenant = Party::new(PartyRole::Participant, "TENANT_1", "Tenant", &contact("b"));
        tenant.id.0 = "B".into();
        record.parties = vec![owner, tenant];
        Arc::new(Mutex::new(record))
    }

    fn vote(user: &str, approved: bool) -> Result<String> {
        Ok(serde_json::json!({"user_id": user, "approved": approved}).to_string())
    }

    #[tokio::test]
    async fn approves_after_last_party() {
        let record = owner_tenant_record(1);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vote("B", true)).await.unwrap();
        tx.send(vote("A", true)).await.unwrap();

        let listener = ApprovalListener::new(Duration::from_secs(5));
        let outcome = listener.listen(&record, &mut rx).await;

        assert_eq!(outcome, ApprovalOutcome::Approved);
        assert!(lock(&record).fully_approved());
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let record = owner_tenant_record(2);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vote("A", false)).await.unwrap();

        let listener = ApprovalListener::new(Duration::from_secs(5));
        let outcome = listener.listen(&record, &mut rx).await;

        assert_eq!(outcome, ApprovalOutcome::Rejected);
        let record = lock(&record);
        assert_eq!(record.party("B").unwrap().vote, Vote::Unset);
        assert!(!record.fully_approved());
        // Sender still open: the listener did not wait for B.
        assert!(!tx.is_closed());
    }

    #[tokio::test]
    async fn rejection_after_partial_approval() {
        let record = owner_tenant_record(3);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vote("B", true)).await.unwrap();
        tx.send(vote("A", false)).await.unwrap();

        let listener = ApprovalListener::new(Duration::from_secs(5));
        assert_eq!(listener.listen(&record, &mut rx).await, ApprovalOutcome::Rejected);
    }

    #[tokio::test]
    async fn expires_at_deadline_without_messages() {
        let record = owner_tenant_record(4);
        let (_tx, mut rx) = mpsc::channel::<Result<String>>(8);

        let timeout = Duration::from_millis(80);
        let listener = ApprovalListener::new(timeout);
        let started = std::time::Instant::now();
        let outcome = listener.listen(&record, &mut rx).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ApprovalOutcome::Expired);
        assert!(elapsed >= timeout, "expired early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_is_not_rearmed_by_traffic() {
        let record = owner_tenant_record(5);
        let (tx, mut rx) = mpsc::channel(64);
        // Keep feeding irrelevant frames faster than the timeout.
        let feeder = tokio::spawn(async move {
            loop {
                if tx.send(vote("stranger", true)).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let listener = ApprovalListener::new(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let outcome = listener.listen(&record, &mut rx).await;
        assert_eq!(outcome, ApprovalOutcome::Expired);
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(rx);
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_and_foreign_frames_are_ignored() {
        let record = owner_tenant_record(6);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(Ok("not json".to_string())).await.unwrap();
        tx.send(Ok(r#"{"userId":"A","status":"APPROVED"}"#.to_string()))
            .await
            .unwrap();
        tx.send(vote("C", false)).await.unwrap();
        tx.send(vote("A", true)).await.unwrap();
        tx.send(vote("B", true)).await.unwrap();

        let listener = ApprovalListener::new(Duration::from_secs(5));
        assert_eq!(listener.listen(&record, &mut rx).await, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn closed_channel_reports_connection_closed() {
        let record = owner_tenant_record(7);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vote("A", true)).await.unwrap();
        drop(tx);

        let listener = ApprovalListener::new(Duration::from_secs(5));
        assert_eq!(
            listener.listen(&record, &mut rx).await,
            ApprovalOutcome::ConnectionClosed
        );
        assert_eq!(lock(&record).party("A").unwrap().vote, Vote::Approved);
    }

    #[tokio::test]
    async fn channel_error_reports_connection_closed() {
        let record = owner_tenant_record(8);
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(Err(CosignError::Channel("reset by peer".into())))
            .await
            .unwrap();

        let listener = ApprovalListener::new(Duration::from_secs(5));
        assert_eq!(
            listener.listen(&record, &mut rx).await,
            ApprovalOutcome::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn concurrent_listeners_on_shared_hub_stay_isolated() {
        let hub = Arc::new(BroadcastHub::new(32));
        let first = owner_tenant_record(10);
        let second = {
            let mut record = AgreementRecord::new(AgreementId(11));
            let mut owner = Party::new(PartyRole::Authority, "AUTHORITY", "Authority", &contact("c"));
            owner.id.0 = "C".into();
            let mut participant =
                Party::new(PartyRole::Participant, "PARTICIPANT", "Participant", &contact("d"));
            participant.id.0 = "D".into();
            record.parties = vec![owner, participant];
            Arc::new(Mutex::new(record))
        };

        let mut first_source = HubSource::new(&hub);
        let mut second_source = HubSource::new(&hub);
        let listener = ApprovalListener::new(Duration::from_secs(5));

        hub.publish(vote("A", true).unwrap());
        hub.publish(vote("C", false).unwrap());
        hub.publish(vote("B", true).unwrap());

        let (a, b) = tokio::join!(
            listener.listen(&first, &mut first_source),
            listener.listen(&second, &mut second_source),
        );
        assert_eq!(a, ApprovalOutcome::Approved);
        assert_eq!(b, ApprovalOutcome::Rejected);
        assert!(!lock(&first).is_rejected());
        assert_eq!(lock(&second).party("D").unwrap().vote, Vote::Unset);
    }
}
