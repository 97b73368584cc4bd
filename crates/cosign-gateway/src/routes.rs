use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};

use cosign_agreement::{AgreementRequest, IdentityUpload, LifecycleReport};
use cosign_core::types::{AgreementId, AgreementKind, RentalTerms, TemplateTerms};

use crate::auth;
use crate::connection;
use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::state::AppState;

// GET /api/health (no auth)
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// POST /api/agreements (Operator+)
pub async fn create_agreement(
    Authenticated(principal): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(terms): Json<RentalTerms>,
) -> Result<Json<LifecycleReport>, ApiError> {
    if !principal.can_submit() {
        return Err(StatusCode::FORBIDDEN.into());
    }
    run_lifecycle(state, AgreementRequest::Direct(terms), principal.name).await
}

#[derive(Deserialize)]
pub struct TemplateBody {
    #[serde(flatten)]
    pub terms: TemplateTerms,
    /// Template text, base64 encoded.
    pub template_base64: String,
}

// POST /api/templates (Operator+)
pub async fn create_template(
    Authenticated(principal): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TemplateBody>,
) -> Result<Json<LifecycleReport>, ApiError> {
    if !principal.can_submit() {
        return Err(StatusCode::FORBIDDEN.into());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body.template_base64.trim())
        .map_err(|e| ApiError::bad_request(format!("template_base64: {e}")))?;
    let template_text = String::from_utf8(bytes)
        .map_err(|_| ApiError::bad_request("template is not valid UTF-8 text"))?;

    let request = AgreementRequest::Template {
        terms: body.terms,
        template_text,
    };
    run_lifecycle(state, request, principal.name).await
}

/// The run is detached from the request so a dropped client does not cancel it.
async fn run_lifecycle(
    state: Arc<AppState>,
    request: AgreementRequest,
    requested_by: String,
) -> Result<Json<LifecycleReport>, ApiError> {
    let task = tokio::spawn(async move {
        state.coordinator.submit(request, &requested_by).await
    });
    let report = task
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(Json(report))
}

// GET /api/agreements/{id} (Viewer+)
pub async fn agreement_status(
    Authenticated(principal): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    status_of(principal, state, AgreementId(id), AgreementKind::Direct).await
}

// GET /api/templates/{id} (Viewer+)
pub async fn template_status(
    Authenticated(principal): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    status_of(principal, state, AgreementId(id), AgreementKind::Template).await
}

async fn status_of(
    principal: auth::Principal,
    state: Arc<AppState>,
    id: AgreementId,
    kind: AgreementKind,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !principal.can_query_status() {
        return Err(StatusCode::FORBIDDEN.into());
    }
    let store = state.coordinator.store();
    let Some(status) = store.agreement_status(id, kind).await? else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no {kind} agreement {id}"),
        ));
    };
    let parties = store.party_statuses(id, kind).await?;

    Ok(Json(serde_json::json!({
        "agreement_id": id,
        "kind": kind,
        "status": status,
        "in_progress": state.coordinator.is_running(id),
        "parties": parties,
    })))
}

#[derive(Deserialize)]
pub struct UploadBody {
    #[serde(alias = "user")]
    pub party_id: String,
    #[serde(default, alias = "imageUrl")]
    pub photo: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

// POST /api/uploads (no auth; the party id is the capability)
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let agreement_id = state
        .uploads
        .attach(
            &body.party_id,
            IdentityUpload {
                photo: body.photo,
                signature: body.signature,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "status": "uploaded",
        "agreement_id": agreement_id,
        "party_id": body.party_id,
    })))
}

// GET /sign/{party_id}/approve
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
) -> Json<serde_json::Value> {
    Json(cast_vote(&state, party_id, true))
}

// GET /sign/{party_id}/reject
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
) -> Json<serde_json::Value> {
    Json(cast_vote(&state, party_id, false))
}

fn cast_vote(state: &AppState, party_id: String, approved: bool) -> serde_json::Value {
    let frame = serde_json::json!({
        "status": if approved { "approved" } else { "rejected" },
        "user_id": party_id,
        "approved": approved,
    });
    let reached = state.hub.publish_json(&frame);
    info!(party_id = %party_id, approved, reached, "Vote received via sign link");
    frame
}

// GET /ws
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!("WebSocket upgrade");
    ws.on_upgrade(move |socket| async move {
        connection::handle_connection(socket, &state.hub).await;
    })
}
