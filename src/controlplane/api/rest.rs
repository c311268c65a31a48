//! REST API Handlers
//!
//! Receives the host framework's lifecycle hooks over HTTP and exposes the
//! mapping index and reconciler status for inspection.

use crate::controlplane::Reconciler;
use crate::domain::topology::{LogicalPort, Network, PortBinding, Segment, Subport};
use crate::engine::MappingEntry;
use crate::error::{ConvergenceError, Error, Result};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Network update hook body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkUpdateRequest {
    pub current: Network,
    pub original: Network,
}

/// Port create and delete hook body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortEventRequest {
    pub port: LogicalPort,
    pub network: Network,
}

/// Port update hook body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortUpdateRequest {
    pub port: LogicalPort,
    pub original: LogicalPort,
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindPortRequest {
    pub port: LogicalPort,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindPortResponse {
    pub bound: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<PortBinding>,
}

/// Subport add/remove hook body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubportsRequest {
    pub parent: LogicalPort,
    pub subports: Vec<Subport>,
}

/// Mapping index entry as served by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResponse {
    pub port_id: String,
    pub switch_id: String,
    pub physical_port: String,
    pub vlan_id: u16,
    pub configured_at: DateTime<Utc>,
}

impl MappingResponse {
    fn new(port_id: String, entry: MappingEntry) -> Self {
        Self {
            port_id,
            switch_id: entry.switch_id,
            physical_port: entry.port_id.to_string(),
            vlan_id: entry.vlan_id.as_u16(),
            configured_at: entry.configured_at,
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP status for an engine error
pub fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::ApiValidation(_) | Error::JsonParse(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } | Error::Resolution(_) => StatusCode::NOT_FOUND,
        Error::Convergence(ConvergenceError::ResolutionFailed { .. }) | Error::TrunkConfig { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::ControllerUnreachable { .. }
        | Error::ControllerTimeout { .. }
        | Error::TrunkMembershipUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::ControllerAuthentication { .. }
        | Error::ControllerRejected { .. }
        | Error::ControllerResponse(_)
        | Error::Convergence(ConvergenceError::ApplyFailed { .. })
        | Error::LinkFailures { .. }
        | Error::HostApi { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &Error) -> Response {
    (
        error_status(error),
        Json(ApiErrorResponse {
            error: error.kind().into(),
            message: error.to_string(),
            details: error.is_retryable().then(|| "retryable".to_string()),
        }),
    )
        .into_response()
}

/// The id in the path must name the object in the body
fn check_path_id(path_id: &str, body_id: &str, kind: &str) -> Result<()> {
    if path_id != body_id {
        return Err(Error::ApiValidation(format!(
            "{} id in path ({}) does not match body ({})",
            kind, path_id, body_id
        )));
    }
    Ok(())
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    reconciler: Arc<Reconciler>,
}

impl RestRouter {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            reconciler: self.reconciler,
        };

        Router::new()
            // Network hooks
            .route("/v1/networks", post(network_created))
            .route("/v1/networks/:id", put(network_updated).delete(network_deleted))
            // Port hooks
            .route("/v1/ports", post(port_created))
            .route("/v1/ports/:id", put(port_updated).delete(port_deleted))
            .route("/v1/ports/:id/binding", post(bind_port))
            // Trunk hooks
            .route(
                "/v1/trunks/:id/subports",
                post(subports_added).delete(subports_removed),
            )
            // Inspection
            .route("/v1/mappings", get(list_mappings))
            .route("/v1/mappings/:id", get(get_mapping))
            .route("/v1/status", get(get_status))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    reconciler: Arc<Reconciler>,
}

// =============================================================================
// Network Handlers
// =============================================================================

async fn network_created(
    State(state): State<AppState>,
    Json(network): Json<Network>,
) -> impl IntoResponse {
    match state.reconciler.on_network_created(&network).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Network create hook failed for {}: {}", network.id, e);
            error_response(&e)
        }
    }
}

async fn network_updated(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<NetworkUpdateRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.current.id, "network") {
        return error_response(&e);
    }
    match state
        .reconciler
        .on_network_updated(&request.current, &request.original)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Network update hook failed for {}: {}", id, e);
            error_response(&e)
        }
    }
}

async fn network_deleted(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(network): Json<Network>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &network.id, "network") {
        return error_response(&e);
    }
    state.reconciler.on_network_deleted(&network).await;
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Port Handlers
// =============================================================================

async fn port_created(
    State(state): State<AppState>,
    Json(request): Json<PortEventRequest>,
) -> impl IntoResponse {
    match state
        .reconciler
        .on_port_created(&request.port, &request.network)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Port create hook failed for {}: {}", request.port.id, e);
            error_response(&e)
        }
    }
}

async fn port_updated(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PortUpdateRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.port.id, "port") {
        return error_response(&e);
    }
    match state
        .reconciler
        .on_port_updated(&request.port, &request.original, &request.network)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Port update hook failed for {}: {}", id, e);
            error_response(&e)
        }
    }
}

async fn port_deleted(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PortEventRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.port.id, "port") {
        return error_response(&e);
    }
    state
        .reconciler
        .on_port_deleted(&request.port, &request.network)
        .await;
    StatusCode::NO_CONTENT.into_response()
}

async fn bind_port(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BindPortRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.port.id, "port") {
        return error_response(&e);
    }
    let binding = state
        .reconciler
        .bind_port(&request.port, &request.segments)
        .await;
    debug!("Bind request for {}: bound={}", id, binding.is_some());
    (
        StatusCode::OK,
        Json(BindPortResponse {
            bound: binding.is_some(),
            binding,
        }),
    )
        .into_response()
}

// =============================================================================
// Trunk Handlers
// =============================================================================

async fn subports_added(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubportsRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.parent.id, "trunk parent") {
        return error_response(&e);
    }
    match state
        .reconciler
        .on_subports_added(&request.parent, &request.subports)
        .await
    {
        Ok(trunk) => (StatusCode::OK, Json(trunk)).into_response(),
        Err(e) => {
            error!("Subport add hook failed for {}: {}", id, e);
            error_response(&e)
        }
    }
}

async fn subports_removed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubportsRequest>,
) -> impl IntoResponse {
    if let Err(e) = check_path_id(&id, &request.parent.id, "trunk parent") {
        return error_response(&e);
    }
    match state
        .reconciler
        .on_subports_removed(&request.parent, &request.subports)
        .await
    {
        Ok(trunk) => (StatusCode::OK, Json(trunk)).into_response(),
        Err(e) => {
            error!("Subport remove hook failed for {}: {}", id, e);
            error_response(&e)
        }
    }
}

// =============================================================================
// Inspection Handlers
// =============================================================================

async fn list_mappings(State(state): State<AppState>) -> impl IntoResponse {
    let mappings: Vec<MappingResponse> = state
        .reconciler
        .mapping()
        .snapshot()
        .into_iter()
        .map(|(port_id, entry)| MappingResponse::new(port_id, entry))
        .collect();
    (StatusCode::OK, Json(mappings))
}

async fn get_mapping(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.mapping().get(&id) {
        Some(entry) => (StatusCode::OK, Json(MappingResponse::new(id, entry))).into_response(),
        None => error_response(&Error::NotFound {
            kind: "mapping".into(),
            id,
        }),
    }
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.reconciler.status()))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready once the controller has answered
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.reconciler.status().controller_reachable {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "controller unreachable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerKind, EngineConfig};
    use crate::controlplane::controller::InMemoryController;
    use crate::controlplane::host::InMemoryHost;
    use crate::metrics::EngineMetrics;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SWITCH: &str = "aa:bb:cc:dd:ee:ff";

    fn app() -> (Router, Arc<InMemoryController>, Arc<Reconciler>) {
        let mut config = EngineConfig::default();
        config.controller.kind = ControllerKind::Memory;
        config.convergence.port_setup_retry_interval_secs = 0;
        config.monitor.monitor_port_state = false;

        let controller = InMemoryController::new();
        controller.add_switch(SWITCH, 8);
        let host = InMemoryHost::new();
        let reconciler = Reconciler::new(
            config,
            controller.clone(),
            host.clone(),
            host,
            EngineMetrics::new().unwrap(),
        );
        (
            RestRouter::new(reconciler.clone()).build(),
            controller,
            reconciler,
        )
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn network() -> Value {
        json!({"id": "net-1", "network_type": "vlan", "segmentation_id": 100})
    }

    fn port(id: &str, switch_port: &str) -> Value {
        json!({
            "id": id,
            "network_id": "net-1",
            "binding": [{"switch_id": SWITCH, "port_id": switch_port}]
        })
    }

    #[tokio::test]
    async fn test_port_lifecycle() {
        let (app, controller, _) = app();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/ports",
                Some(json!({"port": port("p1", "3"), "network": network()})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(controller.submitted().len(), 1);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/v1/mappings/p1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mapping = body_json(response).await;
        assert_eq!(mapping["physicalPort"], "3");
        assert_eq!(mapping["vlanId"], 100);

        let response = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                "/v1/ports/p1",
                Some(json!({"port": port("p1", "3"), "network": network()})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(Method::GET, "/v1/mappings/p1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_path_id_mismatch_rejected() {
        let (app, controller, _) = app();
        let response = app
            .oneshot(request(
                Method::PUT,
                "/v1/ports/p2",
                Some(json!({
                    "port": port("p1", "3"),
                    "original": port("p1", "4"),
                    "network": network()
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation");
        assert!(controller.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_switch_maps_to_unprocessable() {
        let (app, _, reconciler) = app();
        let mut body = json!({"port": port("p1", "3"), "network": network()});
        body["port"]["binding"][0]["switch_id"] = json!("00:00:00:00:00:01");

        let response = app
            .oneshot(request(Method::POST, "/v1/ports", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "resolution_failed");
        assert!(reconciler.mapping().is_empty());
    }

    #[tokio::test]
    async fn test_bind_and_status() {
        let (app, _, _) = app();
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/v1/ports/p1/binding",
                Some(json!({
                    "port": port("p1", "3"),
                    "segments": [{"id": "seg-1", "network_type": "vlan", "segmentation_id": 100}]
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["bound"], true);
        assert_eq!(body["binding"]["segment_id"], "seg-1");

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/v1/status", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["poller"], "stopped");

        // Not initialized, so the controller has not been checked yet
        let response = app
            .oneshot(request(Method::GET, "/ready", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_network_hooks() {
        let (app, controller, _) = app();
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/v1/networks", Some(network())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(controller.networks().len(), 1);

        let response = app
            .oneshot(request(Method::DELETE, "/v1/networks/net-1", Some(network())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(controller.networks().is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&Error::ApiValidation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&Error::ControllerAuthentication {
                reason: "denied".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&Error::TrunkMembershipUnavailable {
                parent_port_id: "p".into(),
                reason: "down".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
