use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cosign_core::config::ModelConfig;
use cosign_core::error::{CosignError, Result};
use cosign_core::traits::DocumentGenerator;
use cosign_core::types::GenerationRequest;

use crate::prompts;

/// OpenAI-compatible chat-completions generator. Works with OpenAI, Ollama,
/// vLLM, Jan and other servers that speak the same protocol.
///
/// Requests are blocking; the orchestrator runs them on its worker pool. The
/// HTTP client is built on first use so it is never created on the event loop.
pub struct ChatGenerator {
    http: OnceLock<Client>,
    config: ModelConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatGenerator {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: OnceLock::new(),
            config,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| CosignError::Generator(format!("HTTP client: {}", e)))?;
        Ok(self.http.get_or_init(|| client))
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn body<'a>(&'a self, request: &GenerationRequest) -> ChatRequest<'a> {
        let (system, user) = prompts::messages(&request.input, &request.signature_placeholders);
        ChatRequest {
            model: &self.config.model_id,
            messages: vec![
                OaiMessage {
                    role: "system",
                    content: system,
                },
                OaiMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        }
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| CosignError::Generator("model returned no content".into()))
}

impl DocumentGenerator for ChatGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = self.endpoint();
        debug!(
            agreement_id = %request.agreement_id,
            model = %self.config.model_id,
            url = %url,
            "Requesting agreement text"
        );

        let mut req = self.client()?.post(&url).json(&self.body(request));
        if let Some(api_key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .map_err(|e| CosignError::Generator(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "unknown".to_string());
            return Err(CosignError::Generator(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| CosignError::Generator(format!("invalid response: {}", e)))?;
        extract_content(parsed)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}
