//! Risk, cross-chain, audit and health endpoints

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, ApiState, OperatorRequest};
use crate::audit::AuditEntry;
use crate::crosschain::{ApplyOutcome, CrossChainSlashMessage, FailedDelivery, ReceiveAck, RetryReport};
use crate::risk::CircuitBreakerState;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub chain_id: String,
    pub credit_paused: bool,
    pub pending_escalations: usize,
    pub timestamp: String,
}

/// GET /risk
pub async fn risk_state(State(state): State<ApiState>) -> Json<CircuitBreakerState> {
    Json(state.engine.risk_state())
}

/// POST /risk/resume - operator only
pub async fn resume(
    State(state): State<ApiState>,
    Json(request): Json<OperatorRequest>,
) -> Result<Json<CircuitBreakerState>, ApiError> {
    Ok(Json(state.engine.resume_breaker(&request.operator)?))
}

/// POST /risk/pause - operator only
pub async fn pause(
    State(state): State<ApiState>,
    Json(request): Json<OperatorRequest>,
) -> Result<Json<CircuitBreakerState>, ApiError> {
    Ok(Json(state.engine.pause_credit(&request.operator)?))
}

/// POST /crosschain/receive - signed messages from source chains
pub async fn receive(
    State(state): State<ApiState>,
    Json(message): Json<CrossChainSlashMessage>,
) -> Result<Json<ReceiveAck>, ApiError> {
    let outcome = state.engine.receive_remote(&message)?;
    let duplicate = outcome == ApplyOutcome::Duplicate;
    let delivery_id = uuid::Uuid::new_v4().to_string();
    debug!(
        source = %message.source_chain,
        nonce = message.nonce,
        delivery_id = %delivery_id,
        duplicate,
        "Acknowledged cross-chain message"
    );
    Ok(Json(ReceiveAck {
        delivery_id,
        duplicate,
    }))
}

/// GET /crosschain/escalations
pub async fn escalations(State(state): State<ApiState>) -> Json<Vec<FailedDelivery>> {
    Json(state.engine.failed_deliveries())
}

/// POST /crosschain/retry - operator only
pub async fn retry(
    State(state): State<ApiState>,
    Json(request): Json<OperatorRequest>,
) -> Result<Json<RetryReport>, ApiError> {
    Ok(Json(state.engine.retry_failed(&request.operator).await?))
}

/// GET /audit/recent
pub async fn recent_audit(
    State(state): State<ApiState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<AuditEntry>> {
    Json(state.engine.audit().get_recent(query.count.min(1_000)))
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let breaker = state.engine.risk_state();
    Json(HealthResponse {
        status: "ok".to_string(),
        chain_id: state.engine.chain_id().to_string(),
        credit_paused: breaker.paused,
        pending_escalations: state.engine.failed_deliveries().len(),
        timestamp: state.engine.now().to_rfc3339(),
    })
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/risk", get(risk_state))
        .route("/risk/resume", post(resume))
        .route("/risk/pause", post(pause))
        .route("/crosschain/receive", post(receive))
        .route("/crosschain/escalations", get(escalations))
        .route("/crosschain/retry", post(retry))
        .route("/audit/recent", get(recent_audit))
        .route("/health", get(health))
}
