//! API Routes
//!
//! HTTP endpoints for evaluation, health checks, status, policy and metrics

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::actions::{build_rpc_policy_from_state, ActionExecutor, LoggingExecutor};
use crate::adaptive::{emit_adaptive_event, AdnSignal, TracingSink};
use crate::api::Metrics;
use crate::config::{ServiceConfig, CONTRACT_VERSION};
use crate::contract::{AdnV3, EvaluationResponse};
use crate::reason::ReasonCode;
use crate::types::NodeDefenseState;
use crate::value::Value;

/// Shared API state
pub struct ApiState {
    pub config: Arc<ServiceConfig>,
    pub engine: AdnV3,

    /// The node's defense state; the lock is held for a whole evaluation
    pub node: Mutex<NodeDefenseState>,

    pub executor: Mutex<Box<dyn ActionExecutor + Send>>,
    pub metrics: Arc<Metrics>,
}

impl ApiState {
    pub fn new(config: Arc<ServiceConfig>, metrics: Arc<Metrics>) -> Self {
        let engine = AdnV3::new(config.defense.clone()).with_component(config.component.clone());
        Self {
            config,
            engine,
            node: Mutex::new(NodeDefenseState::new()),
            executor: Mutex::new(Box::new(LoggingExecutor::new())),
            metrics,
        }
    }

    /// Replace the executor that receives emitted actions
    pub fn with_executor(mut self, executor: Box<dyn ActionExecutor + Send>) -> Self {
        self.executor = Mutex::new(executor);
        self
    }
}

/// Build the router over a shared state
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Evaluation
        .route("/v3/evaluate", post(evaluate))

        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/policy", get(get_policy))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server(config: Arc<ServiceConfig>, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let state = Arc::new(ApiState::new(config.clone(), metrics));
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("🛡️ ADN API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /v3/evaluate - Evaluate one request against the node state
async fn evaluate(State(state): State<Arc<ApiState>>, body: Bytes) -> impl IntoResponse {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Rejected non-JSON body ({} bytes): {}", body.len(), e);
            let response = EvaluationResponse::rejected(
                ReasonCode::InvalidRequest,
                format!("body is not valid JSON: {}", e),
            );
            state.metrics.record_response(&response);
            return (StatusCode::BAD_REQUEST, Json(response));
        }
    };

    let (response, avg_severity) = {
        let mut node = state.node.lock().await;
        let response = state.engine.evaluate(&raw, &mut node);

        if !response.is_error() {
            let policy = build_rpc_policy_from_state(&node, state.engine.config());
            state.executor.lock().await.apply(&response.actions, &policy);
        }
        state.metrics.observe_state(&node);

        (response, node.avg_severity())
    };
    state.metrics.record_response(&response);

    let mut sink = TracingSink;
    emit_adaptive_event(
        Some(&mut sink),
        AdnSignal::from_response(&response, avg_severity).with_node_id(state.config.node_name.clone()),
    );

    let status = if response.is_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Node defense status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let node = state.node.lock().await;

    let status = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "node_name": state.config.node_name,
        "contract": {
            "component": state.engine.component(),
            "contract_version": CONTRACT_VERSION,
            "config_hash": state.engine.config_fingerprint(),
        },
        "defense": {
            "risk_level": node.risk_level,
            "lockdown_state": node.lockdown_state,
            "active_events": node.active_events.len(),
            "avg_severity": node.avg_severity(),
            "last_actions": node.last_actions,
        }
    });

    Json(status)
}

/// GET /policy - RPC policy for the current lockdown state
async fn get_policy(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let node = state.node.lock().await;
    Json(build_rpc_policy_from_state(&node, state.engine.config()))
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    {
        let node = state.node.lock().await;
        state.metrics.observe_state(&node);
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    {
        let node = state.node.lock().await;
        state.metrics.observe_state(&node);
    }

    Json(state.metrics.to_json())
}
