use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CosignError, Result};
use crate::types::AgreementId;

/// Top-level cosign configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory for the database and per-agreement temp files.
    #[serde(default = "default_workspace")]
    pub dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace(),
        }
    }
}

fn default_workspace() -> String { "~/.cosign".to_string() }

/// Retry and worker-pool settings for the external generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Total attempts before the generation is declared failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Size of the blocking worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl GenerationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            workers: default_workers(),
        }
    }
}

fn default_max_attempts() -> u32 { 5 }
fn default_retry_delay_ms() -> u64 { 2000 }
fn default_workers() -> usize { 10 }

/// Where the approval listener reads vote frames from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalSourceKind {
    /// Subscribe to the in-process broadcast hub.
    #[default]
    Local,
    /// Connect to a remote `/ws` endpoint.
    Websocket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Overall deadline for one listening run, measured from subscribe time.
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub source: ApprovalSourceKind,
    #[serde(default)]
    pub websocket_url: Option<String>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
            source: ApprovalSourceKind::Local,
            websocket_url: None,
        }
    }
}

fn default_approval_timeout() -> u64 { 300 }

/// OpenAI-compatible chat-completions endpoint used for drafting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_id: default_model_id(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String { "http://0.0.0.0:1337/v1".to_string() }
fn default_model_id() -> String { "gpt-4o".to_string() }
fn default_temperature() -> f32 { 0.0 }
fn default_request_timeout() -> u64 { 120 }

/// SMTP2GO delivery settings. When absent, documents are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_key: String,
    pub sender: String,
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,
    /// Base for approve/reject links, e.g. `https://sign.example.com/sign`.
    pub approval_base_url: String,
}

fn default_mail_api_url() -> String { "https://api.smtp2go.com/v3/email/send".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    /// Allowed CORS origin. Permissive when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
            api_keys: vec![],
            cors_origin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub role: ApiKeyRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyRole {
    /// Read agreement status only
    Viewer,
    /// Read + submit agreements
    #[default]
    Operator,
    /// Full access
    Admin,
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| CosignError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| CosignError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the lifecycle unusable.
    pub fn validate(&self) -> Result<()> {
        if self.generation.max_attempts == 0 {
            return Err(CosignError::Config(
                "generation.max_attempts must be at least 1".into(),
            ));
        }
        if self.generation.workers == 0 {
            return Err(CosignError::Config("generation.workers must be at least 1".into()));
        }
        if self.approval.source == ApprovalSourceKind::Websocket
            && self.approval.websocket_url.is_none()
        {
            return Err(CosignError::Config(
                "approval.websocket_url is required when approval.source = \"websocket\"".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        let ws = &self.workspace.dir;
        if let Some(rest) = ws.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(ws)
    }

    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir().join("cosign.db")
    }

    /// Root of all per-agreement temp directories.
    pub fn temp_root(&self) -> PathBuf {
        self.workspace_dir().join("tmp")
    }

    /// Temp directory owned by one agreement.
    pub fn agreement_temp_dir(&self, id: AgreementId) -> PathBuf {
        self.temp_root().join(id.to_string())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_COSIGN_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_COSIGN_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_COSIGN_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_COSIGN_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_COSIGN_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.generation.max_attempts, 5);
        assert_eq!(config.generation.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.generation.workers, 10);
        assert_eq!(config.approval.timeout(), Duration::from_secs(300));
        assert_eq!(config.approval.source, ApprovalSourceKind::Local);
        assert_eq!(config.model.model_id, "gpt-4o");
        assert!(config.mail.is_none());
        assert_eq!(config.gateway.bind, "127.0.0.1:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_websocket_source_requires_url() {
        let config: AppConfig = toml::from_str(
            r#"
[approval]
source = "websocket"
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(CosignError::Config(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.generation.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_temp_dirs_are_per_agreement() {
        let mut config = AppConfig::default();
        config.workspace.dir = "/var/lib/cosign".into();
        assert_eq!(
            config.agreement_temp_dir(AgreementId(7)),
            PathBuf::from("/var/lib/cosign/tmp/7")
        );
        assert_ne!(
            config.agreement_temp_dir(AgreementId(7)),
            config.agreement_temp_dir(AgreementId(8))
        );
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/cosign/cosign.db"));
    }
}
