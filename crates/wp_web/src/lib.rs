//! `wp_web` - HTTP trigger and health endpoints for wfm-poller
//!
//! This crate provides:
//! - axum-based HTTP server
//! - `GET /` liveness probe
//! - `GET /api/health` with version and uptime
//! - `GET|POST /poll` which runs one snapshot poll and returns its outcome

use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use wp_collect::{PollOutcome, SnapshotOrchestrator};
use wp_config::WebConfig;

/// Service name reported by the liveness probe
pub const SERVICE_NAME: &str = "five9-poller";

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            WebError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// Shared application state
pub struct AppState {
    /// Pipeline run by `/poll`
    pub poller: Arc<SnapshotOrchestrator>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(poller: Arc<SnapshotOrchestrator>) -> Self {
        Self {
            poller,
            start_time: Instant::now(),
        }
    }
}

pub struct WebServer {
    state: Arc<AppState>,
    config: WebConfig,
}

impl WebServer {
    pub fn new(poller: Arc<SnapshotOrchestrator>, config: WebConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(poller)),
            config,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn run(&self) -> Result<(), WebError> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| WebError::ServerError(err.to_string()))?;
        tracing::info!(%addr, store = self.state.poller.store_name(), "Starting wp_web server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| WebError::ServerError(err.to_string()))?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}

/// Liveness probe response
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub service: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        // Schedulers hit this with either verb
        .route("/poll", get(poll_handler).post(poll_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Run one poll; 200 when it succeeded, 500 otherwise
async fn poll_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<PollOutcome>) {
    let outcome = state.poller.run_poll().await;
    let status = if outcome.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome))
}

async fn not_found_handler(uri: Uri) -> WebError {
    WebError::NotFound(uri.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wp_collect::SoapResponse;
    use wp_collect::testing::{RecordingStore, ScriptedTransport, agent_state_response};
    use wp_config::WpConfig;

    fn state_with(transport: ScriptedTransport, store: RecordingStore) -> Arc<AppState> {
        let poller = SnapshotOrchestrator::from_config(
            Arc::new(transport),
            Arc::new(store),
            &WpConfig::default(),
        );
        Arc::new(AppState::new(Arc::new(poller)))
    }

    fn idle_state() -> Arc<AppState> {
        state_with(ScriptedTransport::new(vec![]), RecordingStore::new())
    }

    fn two_agents() -> String {
        agent_state_response(
            &["Username", "State"],
            &[&["alice", "Ready"], &["bob", "Logged Out"]],
        )
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_web_error_messages() {
        let err = WebError::ServerError("bind failed".to_string());
        assert_eq!(err.to_string(), "Server error: bind failed");

        let err = WebError::NotFound("/nope".to_string());
        assert_eq!(err.to_string(), "Not found: /nope");
    }

    #[tokio::test]
    async fn test_web_error_into_response() {
        let response = WebError::NotFound("missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = WebError::ServerError("crashed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (status, json) = send(create_router(idle_state()), "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "ok", "service": "five9-poller"}));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = send(create_router(idle_state()), "GET", "/api/health").await;
        assert_eq!(status, StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(json).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_poll_success() {
        let state = state_with(ScriptedTransport::ok_with(two_agents()), RecordingStore::new());
        let (status, json) = send(create_router(state), "GET", "/poll").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["agents_total"], 2);
        assert_eq!(json["agents_written"], 1);
        assert_eq!(json["purged"], 0);
        assert!(json["snapshot_ts"].as_str().is_some_and(|ts| ts.ends_with("+00:00")));
        assert!(json["elapsed_sec"].is_number());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_poll_accepts_post() {
        let state = state_with(ScriptedTransport::ok_with(two_agents()), RecordingStore::new());
        let (status, json) = send(create_router(state), "POST", "/poll").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_poll_failure_is_500() {
        let transport = ScriptedTransport::new(vec![Ok(SoapResponse::new(401, "denied"))]);
        let state = state_with(transport, RecordingStore::new());
        let (status, json) = send(create_router(state), "GET", "/poll").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["ok"], false);
        assert_eq!(json["failed_stage"], "session_set");
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|e| e.starts_with("Failed to set Five9 session"))
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, json) = send(create_router(idle_state()), "GET", "/api/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], 404);
        assert_eq!(json["error"], "/api/missing");
    }
}
