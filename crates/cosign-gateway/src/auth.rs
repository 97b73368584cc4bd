use cosign_core::config::{ApiKeyRole, GatewayConfig};

/// Caller of the agreement API. `name` is stored as the agreement's
/// `requested_by`; `role` decides which routes it may use.
///
/// Sign links, uploads and `/ws` never resolve a principal: the party id in
/// the link is the only capability those routes check.
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub role: ApiKeyRole,
}

impl Principal {
    fn from_token() -> Self {
        Self {
            name: "legacy-token".into(),
            role: ApiKeyRole::Admin,
        }
    }

    fn anonymous() -> Self {
        Self {
            name: "anonymous".into(),
            role: ApiKeyRole::Admin,
        }
    }

    /// Operators (the leasing desk, HR) and admins may start agreements.
    pub fn can_submit(&self) -> bool {
        matches!(self.role, ApiKeyRole::Operator | ApiKeyRole::Admin)
    }

    /// Every role may read agreement and party statuses.
    pub fn can_query_status(&self) -> bool {
        matches!(
            self.role,
            ApiKeyRole::Viewer | ApiKeyRole::Operator | ApiKeyRole::Admin
        )
    }
}

/// Resolve the caller: named api key, then the shared gateway token (header
/// or `?token=`), then anonymous admin when nothing is configured.
///
/// Returns `None` when credentials are required but missing or wrong.
pub fn validate_auth(
    config: &GatewayConfig,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> Option<Principal> {
    if let Some(presented) = bearer {
        if let Some(key) = config.api_keys.iter().find(|k| k.key == presented) {
            return Some(Principal {
                name: key.name.clone(),
                role: key.role.clone(),
            });
        }
        return (config.token.as_deref() == Some(presented)).then(Principal::from_token);
    }

    match &config.token {
        Some(expected) => (query_token == Some(expected.as_str())).then(Principal::from_token),
        None if config.api_keys.is_empty() => Some(Principal::anonymous()),
        None => None,
    }
}

/// `?token=...` from a raw query string.
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}
