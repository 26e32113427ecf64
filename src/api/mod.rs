//! HTTP API for the credit engine
//!
//! Provides REST endpoints for:
//! - Claims (submit, challenge, accept, proof, expire, audit)
//! - Reputation (scores, governance activity, operator blacklist, score sync)
//! - Loans and liquidation auctions
//! - Circuit breaker, cross-chain receive/escalations, audit trail
//! - Operator feeds for prices, balance history and pool liquidity
//!
//! Rejections map to an HTTP status by error kind and carry
//! `{error, kind, snapshot}`.

pub mod claims;
pub mod credit;
pub mod error;
pub mod feeds;
pub mod middleware;
pub mod reputation;
pub mod system;

use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

use crate::coordinator::EngineCoordinator;

pub use error::ApiError;
pub use middleware::{
    SecurityMiddlewareConfig, SecurityState, auth_middleware, body_size_middleware,
    logging_middleware, security_headers_middleware,
};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<EngineCoordinator>,
}

/// Body of operator-only actions
#[derive(Debug, Deserialize)]
pub struct OperatorRequest {
    pub operator: String,
}

/// Full application router with security layers
pub fn create_router(engine: Arc<EngineCoordinator>, security: SecurityMiddlewareConfig) -> Router {
    let security_state = SecurityState::new(security);

    Router::new()
        .merge(claims::routes())
        .merge(reputation::routes())
        .merge(credit::routes())
        .merge(feeds::routes())
        .merge(system::routes())
        .with_state(ApiState { engine })
        .layer(axum::middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            security_state.clone(),
            auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            security_state,
            logging_middleware,
        ))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}
