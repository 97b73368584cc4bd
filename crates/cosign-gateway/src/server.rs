use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use cosign_agreement::LifecycleCoordinator;
use cosign_core::config::GatewayConfig;

use crate::routes;
use crate::state::AppState;

/// WebSocket + HTTP gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, coordinator)),
        }
    }

    /// Build the router with every route and the CORS layer applied.
    pub fn router(&self) -> anyhow::Result<Router> {
        let cors = match &self.state.config.cors_origin {
            Some(origin) => {
                let origin: HeaderValue = origin
                    .parse()
                    .with_context(|| format!("invalid cors_origin {origin:?}"))?;
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
            None => CorsLayer::permissive(),
        };

        Ok(Router::new()
            // WebSocket
            .route("/ws", get(routes::ws_handler))
            // REST API
            .route("/api/health", get(routes::health))
            .route("/api/agreements", post(routes::create_agreement))
            .route("/api/agreements/{id}", get(routes::agreement_status))
            .route("/api/templates", post(routes::create_template))
            .route("/api/templates/{id}", get(routes::template_status))
            .route("/api/uploads", post(routes::upload))
            // Sign links
            .route("/sign/{party_id}/approve", get(routes::approve))
            .route("/sign/{party_id}/reject", get(routes::reject))
            .layer(cors)
            .with_state(self.state.clone()))
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router()?;
        let bind = &self.state.config.bind;

        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("binding gateway to {bind}"))?;
        info!(bind = %bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use futures::{SinkExt, StreamExt};
    use tower::ServiceExt;

    use cosign_core::config::{ApiKeyConfig, ApiKeyRole};
    use cosign_core::event::BroadcastHub;
    use cosign_core::types::{AgreementKind, AgreementStatus, Delivery};
    use cosign_test_utils::{fixtures, MemoryStore, RecordingNotifier, ScriptedGenerator};

    use super::*;

    struct Harness {
        server: GatewayServer,
        generator: Arc<ScriptedGenerator>,
        notifier: Arc<RecordingNotifier>,
        store: Arc<MemoryStore>,
        hub: Arc<BroadcastHub>,
        _dir: tempfile::TempDir,
    }

    fn harness(gateway: GatewayConfig) -> Harness {
        harness_with(gateway, RecordingNotifier::new())
    }

    fn harness_with(gateway: GatewayConfig, notifier: RecordingNotifier) -> Harness {
        let (dir, config) = fixtures::temp_config();
        let generator = Arc::new(ScriptedGenerator::always("# Agreement\n\nTerms apply."));
        let notifier = Arc::new(notifier);
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(BroadcastHub::new(64));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            &config,
            generator.clone(),
            notifier.clone(),
            store.clone(),
            hub.clone(),
        ));
        Harness {
            server: GatewayServer::new(gateway, coordinator),
            generator,
            notifier,
            store,
            hub,
            _dir: dir,
        }
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = bearer {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn rental_body(tenants: usize) -> serde_json::Value {
        serde_json::to_value(fixtures::rental_terms(tenants)).unwrap()
    }

    async fn drafts(h: &Harness, n: usize) -> Vec<Delivery> {
        tokio::time::timeout(Duration::from_secs(5), h.notifier.wait_for(n))
            .await
            .expect("drafts were not delivered");
        h.notifier.deliveries().into_iter().take(n).collect()
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let h = harness(GatewayConfig {
            token: Some("secret".into()),
            ..GatewayConfig::default()
        });
        let resp = h.server.router().unwrap().oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn rejects_missing_token_and_viewer_submissions() {
        let h = harness(GatewayConfig {
            api_keys: vec![ApiKeyConfig {
                name: "dashboard".into(),
                key: "ck_view".into(),
                role: ApiKeyRole::Viewer,
            }],
            ..GatewayConfig::default()
        });
        let app = h.server.router().unwrap();

        let resp = app
            .clone()
            .oneshot(post_json("/api/agreements", &rental_body(1), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(post_json("/api/agreements", &rental_body(1), Some("ck_view")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(h.store.last_id().is_none());
    }

    #[tokio::test]
    async fn direct_agreement_approved_over_sign_links() {
        let h = harness(GatewayConfig::default());
        let app = h.server.router().unwrap();

        let submit = tokio::spawn(
            app.clone()
                .oneshot(post_json("/api/agreements", &rental_body(1), None)),
        );

        for delivery in drafts(&h, 2).await {
            let uri = format!("/sign/{}/approve", delivery.party_id.as_str());
            let resp = app.clone().oneshot(get_req(&uri)).await.unwrap();
            let vote = json_body(resp).await;
            assert_eq!(vote["status"], "approved");
            assert_eq!(vote["approved"], true);
        }

        let resp = submit.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = json_body(resp).await;
        assert_eq!(report["status"], "APPROVED");
        assert_eq!(report["message"], "Final signed agreement sent to all parties!");

        let id = h.store.last_id().unwrap();
        assert_eq!(h.store.status(id, AgreementKind::Direct), Some(AgreementStatus::Approved));
        assert_eq!(
            h.generator.requests()[0].signature_placeholders,
            vec!["[OWNER_SIGNATURE]".to_string(), "[TENANT_1_SIGNATURE]".to_string()]
        );

        let resp = app
            .oneshot(get_req(&format!("/api/agreements/{}", id.0)))
            .await
            .unwrap();
        let status = json_body(resp).await;
        assert_eq!(status["status"], "APPROVED");
        assert_eq!(status["in_progress"], false);
        assert_eq!(status["parties"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn template_rejection_reported() {
        let h = harness(GatewayConfig::default());
        let app = h.server.router().unwrap();

        let mut body = serde_json::to_value(fixtures::template_terms()).unwrap();
        body["template_base64"] = base64::engine::general_purpose::STANDARD
            .encode("Offer letter for {{name}}")
            .into();
        let submit = tokio::spawn(app.clone().oneshot(post_json("/api/templates", &body, None)));

        let first = drafts(&h, 2).await.remove(0);
        let uri = format!("/sign/{}/reject", first.party_id.as_str());
        app.clone().oneshot(get_req(&uri)).await.unwrap();

        let report = json_body(submit.await.unwrap().unwrap()).await;
        assert_eq!(report["status"], "REJECTED");

        let id = h.store.last_id().unwrap();
        let resp = app
            .oneshot(get_req(&format!("/api/templates/{}", id.0)))
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["kind"], "template");
    }

    #[tokio::test]
    async fn bad_template_encoding_is_400() {
        let h = harness(GatewayConfig::default());
        let mut body = serde_json::to_value(fixtures::template_terms()).unwrap();
        body["template_base64"] = "%%% not base64".into();

        let resp = h
            .server
            .router()
            .unwrap()
            .oneshot(post_json("/api/templates", &body, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(h.store.last_id().is_none());
    }

    #[tokio::test]
    async fn invalid_request_is_400() {
        let h = harness(GatewayConfig::default());
        let resp = h
            .server
            .router()
            .unwrap()
            .oneshot(post_json("/api/agreements", &rental_body(0), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn refused_delivery_is_502_and_persisted_failed() {
        let h = harness_with(GatewayConfig::default(), RecordingNotifier::refusing());
        let resp = h
            .server
            .router()
            .unwrap()
            .oneshot(post_json("/api/agreements", &rental_body(1), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let id = h.store.last_id().unwrap();
        assert_eq!(h.store.status(id, AgreementKind::Direct), Some(AgreementStatus::Failed));
    }

    #[tokio::test]
    async fn unknown_agreement_and_party_are_404() {
        let h = harness(GatewayConfig::default());
        let app = h.server.router().unwrap();

        let resp = app.clone().oneshot(get_req("/api/agreements/999")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = serde_json::json!({
            "user": "no-such-party",
            "signature": base64::engine::general_purpose::STANDARD.encode(b"png"),
        });
        let resp = app.oneshot(post_json("/api/uploads", &body, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sign_link_publishes_vote_frame() {
        let h = harness(GatewayConfig::default());
        let mut frames = h.hub.subscribe();

        let resp = h
            .server
            .router()
            .unwrap()
            .oneshot(get_req("/sign/p-42/reject"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let frame: serde_json::Value =
            serde_json::from_str(&frames.recv().await.unwrap()).unwrap();
        assert_eq!(frame["user_id"], "p-42");
        assert_eq!(frame["approved"], false);
        assert_eq!(frame["status"], "rejected");
    }

    #[tokio::test]
    async fn websocket_fans_out_hub_frames() {
        let h = harness(GatewayConfig::default());
        let app = h.server.router().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.hub.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        h.hub.publish(r#"{"userId":"p-1","status":"APPROVED"}"#);
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(msg.to_text().unwrap().contains("\"userId\":\"p-1\""));

        // Client frames never reach the hub, so a socket cannot cast votes.
        let mut frames = h.hub.subscribe();
        ws.send(tokio_tungstenite::tungstenite::Message::Text(
            r#"{"user_id":"p-2","approved":true}"#.into(),
        ))
        .await
        .unwrap();
        h.hub.publish(r#"{"userId":"p-3","status":"REJECTED"}"#);
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(msg.to_text().unwrap().contains("p-3"));
        assert!(frames.recv().await.unwrap().contains("p-3"));
        assert!(
            tokio::time::timeout(Duration::from_millis(200), frames.recv())
                .await
                .is_err()
        );

        shutdown.cancel();
    }

    #[test]
    fn rejects_malformed_cors_origin() {
        let h = harness(GatewayConfig {
            cors_origin: Some("bad\norigin".into()),
            ..GatewayConfig::default()
        });
        assert!(h.server.router().is_err());
    }
}
