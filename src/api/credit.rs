//! Loan and auction endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::coordinator::LiquidationSettlement;
use crate::credit::{HealthReport, LiquidationAuction, Loan, RepayOutcome};

#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub borrower: String,
    pub collateral_asset: String,
    pub collateral_amount: u128,
    pub principal: u128,
}

#[derive(Debug, Deserialize)]
pub struct RepayRequest {
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct FillRequest {
    pub liquidator: String,
}

#[derive(Debug, Serialize)]
pub struct LoanResponse {
    pub loan: Loan,
    pub health: Option<HealthReport>,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub auction: LiquidationAuction,
    /// Price a fill would pay right now
    pub current_price: u128,
}

/// POST /loans
pub async fn borrow(
    State(state): State<ApiState>,
    Json(request): Json<BorrowRequest>,
) -> Result<Json<Loan>, ApiError> {
    Ok(Json(state.engine.borrow(
        &request.borrower,
        &request.collateral_asset,
        request.collateral_amount,
        request.principal,
    )?))
}

/// GET /loans/{id}
pub async fn get_loan(
    State(state): State<ApiState>,
    Path(loan_id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = state
        .engine
        .get_loan(&loan_id)
        .ok_or_else(|| ApiError::NotFound(format!("Loan {}", loan_id)))?;
    let health = if loan.is_open() {
        state.engine.loan_health(&loan_id).ok()
    } else {
        None
    };
    Ok(Json(LoanResponse { loan, health }))
}

/// POST /loans/{id}/repay
pub async fn repay(
    State(state): State<ApiState>,
    Path(loan_id): Path<String>,
    Json(request): Json<RepayRequest>,
) -> Result<Json<RepayOutcome>, ApiError> {
    Ok(Json(state.engine.repay(&loan_id, request.amount)?))
}

/// POST /loans/{id}/poke - refresh health and start the grace clock
pub async fn poke(
    State(state): State<ApiState>,
    Path(loan_id): Path<String>,
) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(state.engine.poke_health(&loan_id)?))
}

/// POST /loans/{id}/liquidate
pub async fn liquidate(
    State(state): State<ApiState>,
    Path(loan_id): Path<String>,
) -> Result<Json<LiquidationAuction>, ApiError> {
    Ok(Json(state.engine.start_liquidation(&loan_id)?))
}

/// GET /auctions/{id}
pub async fn get_auction(
    State(state): State<ApiState>,
    Path(auction_id): Path<String>,
) -> Result<Json<AuctionResponse>, ApiError> {
    let auction = state
        .engine
        .get_auction(&auction_id)
        .ok_or_else(|| ApiError::NotFound(format!("Auction {}", auction_id)))?;
    let current_price = auction.quote(state.engine.now());
    Ok(Json(AuctionResponse {
        auction,
        current_price,
    }))
}

/// POST /auctions/{id}/fill
pub async fn fill(
    State(state): State<ApiState>,
    Path(auction_id): Path<String>,
    Json(request): Json<FillRequest>,
) -> Result<Json<LiquidationSettlement>, ApiError> {
    Ok(Json(
        state
            .engine
            .fill_auction(&auction_id, &request.liquidator)
            .await?,
    ))
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/loans", post(borrow))
        .route("/loans/{loan_id}", get(get_loan))
        .route("/loans/{loan_id}/repay", post(repay))
        .route("/loans/{loan_id}/poke", post(poke))
        .route("/loans/{loan_id}/liquidate", post(liquidate))
        .route("/auctions/{auction_id}", get(get_auction))
        .route("/auctions/{auction_id}/fill", post(fill))
}
