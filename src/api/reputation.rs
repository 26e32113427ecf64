//! Reputation endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, OperatorRequest};
use crate::coordinator::BlacklistResult;
use crate::crosschain::BroadcastReport;
use crate::reputation::{ReputationRecord, ReputationTier, ScoreUpdate};

#[derive(Debug, Serialize)]
pub struct ReputationResponse {
    pub subject: String,
    pub score: u32,
    pub tier: ReputationTier,
    pub max_ltv_bps: u32,
    pub on_probation: bool,
    pub is_blacklisted: bool,
    pub age_months: i64,
    pub record: Option<ReputationRecord>,
}

#[derive(Debug, Deserialize)]
pub struct GovernanceRequest {
    pub votes_cast: u32,
    pub eligible_votes: u32,
    #[serde(default)]
    pub proposals: u32,
}

/// GET /reputation/{subject}
///
/// Unknown subjects read as unrated; nothing is created.
pub async fn get_reputation(
    State(state): State<ApiState>,
    Path(subject): Path<String>,
) -> Json<ReputationResponse> {
    let now = state.engine.now();
    let store = state.engine.reputation_store();
    let record = store.get(&subject, now);
    let snapshot = store.snapshot(&subject, now);
    let policy = store.tiers().tier_for(snapshot.score);

    Json(ReputationResponse {
        subject,
        score: snapshot.score,
        tier: policy.tier,
        max_ltv_bps: policy.max_ltv_bps,
        on_probation: snapshot.on_probation(now),
        is_blacklisted: snapshot.is_blacklisted,
        age_months: snapshot.age_months(now),
        record,
    })
}

/// POST /reputation/{subject}/governance
pub async fn record_governance(
    State(state): State<ApiState>,
    Path(subject): Path<String>,
    Json(request): Json<GovernanceRequest>,
) -> Result<Json<ScoreUpdate>, ApiError> {
    Ok(Json(state.engine.record_governance_activity(
        &subject,
        request.votes_cast,
        request.eligible_votes,
        request.proposals,
    )?))
}

/// POST /reputation/{subject}/blacklist - operator only
pub async fn blacklist(
    State(state): State<ApiState>,
    Path(subject): Path<String>,
    Json(request): Json<OperatorRequest>,
) -> Result<Json<BlacklistResult>, ApiError> {
    Ok(Json(state.engine.blacklist(&request.operator, &subject).await?))
}

/// POST /reputation/{subject}/sync
pub async fn sync_score(
    State(state): State<ApiState>,
    Path(subject): Path<String>,
) -> Result<Json<BroadcastReport>, ApiError> {
    Ok(Json(state.engine.sync_score(&subject).await?))
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/reputation/{subject}", get(get_reputation))
        .route("/reputation/{subject}/governance", post(record_governance))
        .route("/reputation/{subject}/blacklist", post(blacklist))
        .route("/reputation/{subject}/sync", post(sync_score))
}
