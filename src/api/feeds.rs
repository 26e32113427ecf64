//! Operator feed endpoints: oracle prices, balance history, pool liquidity

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::claims::BalanceSample;
use crate::external::PriceQuote;

#[derive(Debug, Deserialize)]
pub struct PublishPriceRequest {
    pub operator: String,
    pub asset: String,
    /// Micro-USD per whole collateral unit
    pub price: u128,
}

#[derive(Debug, Deserialize)]
pub struct IndexSamplesRequest {
    pub operator: String,
    pub address: String,
    pub samples: Vec<BalanceSample>,
}

#[derive(Debug, Serialize)]
pub struct IndexSamplesResponse {
    pub address: String,
    pub recorded: usize,
}

#[derive(Debug, Deserialize)]
pub struct FundPoolRequest {
    pub operator: String,
    pub asset: String,
    pub amount: u128,
}

#[derive(Debug, Serialize)]
pub struct FundPoolResponse {
    pub asset: String,
    pub pool_balance: i128,
}

/// POST /oracle/prices - operator only
pub async fn publish_price(
    State(state): State<ApiState>,
    Json(request): Json<PublishPriceRequest>,
) -> Result<Json<PriceQuote>, ApiError> {
    Ok(Json(state.engine.publish_price(
        &request.operator,
        &request.asset,
        request.price,
    )?))
}

/// POST /indexer/samples - operator only
pub async fn index_samples(
    State(state): State<ApiState>,
    Json(request): Json<IndexSamplesRequest>,
) -> Result<Json<IndexSamplesResponse>, ApiError> {
    let recorded = state
        .engine
        .index_balances(&request.operator, &request.address, &request.samples)?;
    Ok(Json(IndexSamplesResponse {
        address: request.address,
        recorded,
    }))
}

/// POST /pool/fund - operator only
pub async fn fund_pool(
    State(state): State<ApiState>,
    Json(request): Json<FundPoolRequest>,
) -> Result<Json<FundPoolResponse>, ApiError> {
    let pool_balance = state
        .engine
        .operator_fund_pool(&request.operator, &request.asset, request.amount)?;
    Ok(Json(FundPoolResponse {
        asset: request.asset,
        pool_balance,
    }))
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/oracle/prices", post(publish_price))
        .route("/indexer/samples", post(index_samples))
        .route("/pool/fund", post(fund_pool))
}
