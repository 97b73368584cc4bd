use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use cosign_core::config::GenerationConfig;
use cosign_core::error::{CosignError, Result};
use cosign_core::traits::DocumentGenerator;
use cosign_core::types::{GenerationInput, GenerationRequest};

use crate::pool::WorkerPool;
use crate::record::remove_file_quietly;
use crate::registry::{lock, SharedRecord};
use crate::render::{self, SignatureSlot};

/// Runs the external generator with a fixed retry budget and renders its output.
pub struct GenerationOrchestrator {
    generator: Arc<dyn DocumentGenerator>,
    pool: WorkerPool,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn DocumentGenerator>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            pool: WorkerPool::new(config.workers),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Produce the record's document and return its path.
    ///
    /// On a record that already holds generated text the generator is not
    /// called again; the stored text is re-rendered, with signatures
    /// substituted once every party has approved.
    pub async fn generate(&self, record: &SharedRecord, input: GenerationInput) -> Result<PathBuf> {
        if lock(record).is_final_rendered {
            return self.rerender(record).await;
        }

        let (agreement_id, placeholders, slots) = {
            let r = lock(record);
            (r.agreement_id, r.signature_placeholders(), signature_slots(&r))
        };
        let request = GenerationRequest {
            agreement_id,
            input,
            signature_placeholders: placeholders,
        };

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let path = lock(record).next_document_path().ok_or_else(|| {
                CosignError::Render(format!("agreement {} has no temp dir", agreement_id))
            })?;

            let generator = self.generator.clone();
            let job_request = request.clone();
            let job_slots = slots.clone();
            let job_path = path.clone();
            let result = self
                .pool
                .run(move || {
                    let text = generator.generate(&job_request)?;
                    if text.trim().is_empty() {
                        return Err(CosignError::Generator("generator returned an empty document".into()));
                    }
                    let text = render::ensure_signature_block(&render::normalize(&text), &job_slots);
                    render::write_document(&job_path, &text)?;
                    Ok(text)
                })
                .await;

            match result {
                Ok(text) => {
                    let mut r = lock(record);
                    r.document_text = text;
                    r.replace_document(path.clone());
                    r.is_final_rendered = true;
                    info!(agreement_id = %agreement_id, attempt, path = %path.display(), "Agreement generated");
                    return Ok(path);
                }
                Err(e) => {
                    // Nothing from a failed attempt may leak into the next one.
                    remove_file_quietly(&path);
                    if attempt < self.max_attempts {
                        warn!(
                            agreement_id = %agreement_id,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = self.retry_delay.as_millis() as u64,
                            error = %e,
                            "Retrying agreement generation"
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".into());
        warn!(
            agreement_id = %agreement_id,
            attempts = self.max_attempts,
            error = %message,
            "Agreement generation failed"
        );
        Err(CosignError::Generation {
            attempts: self.max_attempts,
            message,
        })
    }

    /// Render the stored text again without calling the generator.
    async fn rerender(&self, record: &SharedRecord) -> Result<PathBuf> {
        let (agreement_id, text, slots, substitute, path) = {
            let mut r = lock(record);
            let path = r.next_document_path().ok_or_else(|| {
                CosignError::Render(format!("agreement {} has no temp dir", r.agreement_id))
            })?;
            warn_on_signature_drift(&r);
            (
                r.agreement_id,
                r.document_text.clone(),
                signature_slots(&r),
                r.fully_approved(),
                path,
            )
        };

        let job_path = path.clone();
        let result = self
            .pool
            .run(move || {
                let content = if substitute {
                    render::substitute_signatures(&text, &slots)
                } else {
                    text
                };
                render::write_document(&job_path, &content)
            })
            .await;

        if let Err(e) = result {
            remove_file_quietly(&path);
            return Err(e);
        }

        lock(record).replace_document(path.clone());
        info!(
            agreement_id = %agreement_id,
            signed = substitute,
            path = %path.display(),
            "Agreement re-rendered"
        );
        Ok(path)
    }
}

fn signature_slots(record: &crate::record::AgreementRecord) -> Vec<SignatureSlot> {
    record
        .parties
        .iter()
        .map(|p| SignatureSlot {
            placeholder: p.signature_placeholder(),
            label: p.role_label.clone(),
            name: p.display_name.clone(),
            signature: p.signature_ref.clone(),
        })
        .collect()
}

/// Last write wins: the render uses the current signature even if it changed
/// after the party voted. Flag it so the divergence is visible.
fn warn_on_signature_drift(record: &crate::record::AgreementRecord) {
    for party in &record.parties {
        if party.vote == cosign_core::types::Vote::Approved
            && party.signature_at_vote != party.signature_ref
        {
            warn!(
                agreement_id = %record.agreement_id,
                party_id = %party.id,
                "Signature changed after approval; rendering the latest upload"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use cosign_core::types::{AgreementId, ContactDetails, PartyRole};
    use cosign_test_utils::ScriptedGenerator;

    use super::*;
    use crate::record::Party;
    use crate::registry::StateRegistry;

    fn input() -> GenerationInput {
        GenerationInput::Template {
            prompt: "Offer letter for Ben".into(),
            template_text: "OFFER LETTER".into(),
        }
    }

    fn config(max_attempts: u32, retry_delay_ms: u64) -> GenerationConfig {
        GenerationConfig {
            max_attempts,
            retry_delay_ms,
            workers: 2,
        }
    }

    fn prepared_record(dir: &std::path::Path, id: i64) -> SharedRecord {
        let registry = StateRegistry::new();
        let record = registry.get_or_create(AgreementId(id));
        {
            let mut r = lock(&record);
            r.temp_dir = Some(dir.join(id.to_string()));
            r.parties = vec![
                Party::new(
                    PartyRole::Authority,
                    "AUTHORITY",
                    "Authority",
                    &ContactDetails { name: "HR".into(), email: "hr@example.com".into() },
                ),
                Party::new(
                    PartyRole::Participant,
                    "PARTICIPANT",
                    "Participant",
                    &ContactDetails { name: "Ben".into(), email: "ben@example.com".into() },
                ),
            ];
        }
        record
    }

    #[tokio::test]
    async fn success_populates_document() {
        let dir = tempfile::tempdir().unwrap();
        let record = prepared_record(dir.path(), 1);
        let generator = Arc::new(ScriptedGenerator::always("# Agreement\n\nTerms apply."));
        let orchestrator = GenerationOrchestrator::new(generator.clone(), &config(3, 1));

        let path = orchestrator.generate(&record, input()).await.unwrap();

        assert!(path.exists());
        let r = lock(&record);
        assert!(r.is_final_rendered);
        assert_eq!(r.document_path.as_ref(), Some(&path));
        assert!(r.document_text.contains("[AUTHORITY_SIGNATURE]"));
        assert!(r.document_text.contains("[PARTICIPANT_SIGNATURE]"));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn always_failing_generator_hits_retry_bound() {
        let dir = tempfile::tempdir().unwrap();
        let record = prepared_record(dir.path(), 2);
        let generator = Arc::new(ScriptedGenerator::failing("model unavailable"));
        let delay = Duration::from_millis(20);
        let orchestrator = GenerationOrchestrator::new(generator.clone(), &config(4, 20));

        let started = Instant::now();
        let err = orchestrator.generate(&record, input()).await.unwrap_err();

        assert!(matches!(err, CosignError::Generation { attempts: 4, .. }));
        assert_eq!(generator.calls(), 4);
        assert!(started.elapsed() >= delay * 3);
        let times = generator.call_times();
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= delay);
        }
        let r = lock(&record);
        assert!(!r.is_final_rendered);
        assert!(r.document_path.is_none());
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let record = prepared_record(dir.path(), 3);
        let generator = Arc::new(ScriptedGenerator::sequence(vec![
            Err("timeout".into()),
            Ok("   ".into()),
            Ok("Final text".into()),
        ]));
        let orchestrator = GenerationOrchestrator::new(generator.clone(), &config(5, 1));

        let path = orchestrator.generate(&record, input()).await.unwrap();
        assert_eq!(generator.calls(), 3);

        // Only the successful attempt's file remains.
        let files: Vec<_> = std::fs::read_dir(dir.path().join("3"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files, vec![path]);
    }

    #[tokio::test]
    async fn rerender_skips_generator_and_substitutes_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let record = prepared_record(dir.path(), 4);
        let generator = Arc::new(ScriptedGenerator::always("Body"));
        let orchestrator = GenerationOrchestrator::new(generator.clone(), &config(3, 1));

        let first = orchestrator.generate(&record, input()).await.unwrap();
        {
            let mut r = lock(&record);
            let ids: Vec<String> = r.parties.iter().map(|p| p.id.0.clone()).collect();
            let signature = dir.path().join("hr-signature.png");
            std::fs::write(&signature, b"hr-sig").unwrap();
            r.party_mut(&ids[0]).unwrap().signature_ref = Some(signature);
            for id in &ids {
                r.cast_vote(id, true);
            }
        }

        let second = orchestrator.generate(&record, input()).await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert_ne!(first, second);
        assert!(!first.exists());
        let rendered = std::fs::read_to_string(&second).unwrap();
        assert!(rendered.contains("![Authority signature](data:image/png;base64,"));
        assert!(!rendered.contains("hr-signature.png"));
        assert!(!rendered.contains("[PARTICIPANT_SIGNATURE]"));
        // Stored text keeps its placeholders for any later render.
        assert!(lock(&record).document_text.contains("[AUTHORITY_SIGNATURE]"));
    }
}
