//! Claim endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, ApiState};
use crate::claims::{Claim, ClaimAudit, ClaimParams};
use crate::coordinator::ClaimFinalization;

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub challenger: String,
    pub stake: u128,
}

#[derive(Debug, Deserialize)]
pub struct ProofRequest {
    pub caller: String,
    /// Hex-encoded proof bytes
    pub proof: String,
}

/// POST /claims
pub async fn submit_claim(
    State(state): State<ApiState>,
    Json(params): Json<ClaimParams>,
) -> Result<Json<Claim>, ApiError> {
    let claim = state.engine.submit_claim(params)?;
    info!(claim_id = %claim.id, claimant = %claim.claimant, "Claim submitted via API");
    Ok(Json(claim))
}

/// GET /claims/{id}
pub async fn get_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<Json<Claim>, ApiError> {
    state
        .engine
        .get_claim(&claim_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Claim {}", claim_id)))
}

/// POST /claims/{id}/challenge
pub async fn challenge_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<Claim>, ApiError> {
    Ok(Json(state.engine.challenge_claim(
        &claim_id,
        &request.challenger,
        request.stake,
    )?))
}

/// POST /claims/{id}/accept
pub async fn accept_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<Json<ClaimFinalization>, ApiError> {
    Ok(Json(state.engine.auto_accept(&claim_id).await?))
}

/// POST /claims/{id}/proof
pub async fn submit_proof(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
    Json(request): Json<ProofRequest>,
) -> Result<Json<ClaimFinalization>, ApiError> {
    let proof = hex::decode(request.proof.trim_start_matches("0x"))
        .map_err(|e| ApiError::BadRequest(format!("proof is not hex: {}", e)))?;
    Ok(Json(
        state
            .engine
            .resolve_with_proof(&claim_id, &request.caller, &proof)
            .await?,
    ))
}

/// POST /claims/{id}/expire
pub async fn expire_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<Json<ClaimFinalization>, ApiError> {
    Ok(Json(state.engine.expire_challenge(&claim_id).await?))
}

/// GET /claims/{id}/audit - watcher check against indexed balances
pub async fn audit_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<Json<ClaimAudit>, ApiError> {
    if state.engine.get_claim(&claim_id).is_none() {
        return Err(ApiError::NotFound(format!("Claim {}", claim_id)));
    }
    state
        .engine
        .audit_claim(&claim_id)
        .map(Json)
        .map_err(|e| ApiError::Upstream(format!("{:#}", e)))
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/claims", post(submit_claim))
        .route("/claims/{claim_id}", get(get_claim))
        .route("/claims/{claim_id}/challenge", post(challenge_claim))
        .route("/claims/{claim_id}/accept", post(accept_claim))
        .route("/claims/{claim_id}/proof", post(submit_proof))
        .route("/claims/{claim_id}/expire", post(expire_claim))
        .route("/claims/{claim_id}/audit", get(audit_claim))
}
