use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use cosign_core::config::MailConfig;
use cosign_core::error::{CosignError, Result};
use cosign_core::traits::Notifier;
use cosign_core::types::Delivery;

use crate::template;

/// Sends agreement documents through the SMTP2GO HTTP API.
pub struct Smtp2goNotifier {
    http: reqwest::Client,
    config: MailConfig,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    sender: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html_body: String,
    attachments: Vec<Attachment>,
}

#[derive(Serialize)]
struct Attachment {
    fileblob: String,
    filename: String,
    content_type: &'static str,
}

impl Smtp2goNotifier {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn payload<'a>(&'a self, delivery: &'a Delivery, document: &[u8]) -> SendRequest<'a> {
        SendRequest {
            sender: &self.config.sender,
            to: vec![delivery.email.as_str()],
            subject: template::subject(delivery),
            html_body: template::html_body(delivery, &self.config.approval_base_url),
            attachments: vec![Attachment {
                fileblob: STANDARD.encode(document),
                filename: attachment_name(delivery),
                content_type: "text/markdown",
            }],
        }
    }
}

fn attachment_name(delivery: &Delivery) -> String {
    if delivery.is_final {
        format!("agreement-{}-signed.md", delivery.agreement_id)
    } else {
        format!("agreement-{}.md", delivery.agreement_id)
    }
}

impl Notifier for Smtp2goNotifier {
    fn send(&self, delivery: &Delivery) -> BoxFuture<'_, Result<bool>> {
        let delivery = delivery.clone();
        Box::pin(async move {
            let document = tokio::fs::read(&delivery.document_path).await.map_err(|e| {
                CosignError::Mail(format!(
                    "read {}: {}",
                    delivery.document_path.display(),
                    e
                ))
            })?;

            let response = self
                .http
                .post(&self.config.api_url)
                .header("X-Smtp2go-Api-Key", &self.config.api_key)
                .json(&self.payload(&delivery, &document))
                .send()
                .await
                .map_err(|e| CosignError::Mail(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                info!(
                    agreement_id = %delivery.agreement_id,
                    recipient = %delivery.email,
                    is_final = delivery.is_final,
                    "Email sent"
                );
                Ok(true)
            } else {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                warn!(
                    agreement_id = %delivery.agreement_id,
                    recipient = %delivery.email,
                    status = %status,
                    body = %body,
                    "Email rejected by SMTP2GO"
                );
                Ok(false)
            }
        })
    }
}
