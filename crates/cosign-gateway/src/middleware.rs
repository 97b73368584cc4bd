use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};

use crate::auth::{self, Principal};
use crate::state::AppState;

/// Caller of an agreement route, resolved from `Authorization: Bearer` or
/// `?token=`. Routes check the role themselves; this only rejects unknown
/// credentials with 401.
pub struct Authenticated(pub Principal);

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = bearer_token(parts);
        let query_token = parts.uri.query().and_then(auth::extract_token_from_query);

        let result = auth::validate_auth(&state.config, bearer.as_deref(), query_token)
            .map(Authenticated)
            .ok_or(StatusCode::UNAUTHORIZED);

        async move { result }
    }
}
