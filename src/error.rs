//! Engine error taxonomy
//!
//! Every rejected operation maps onto one [`ErrorKind`] so callers can decide
//! whether to retry, escalate, or abandon. A failed transition leaves every
//! entity exactly as it was before the call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::Claim;
use crate::credit::{LiquidationAuction, Loan};
use crate::reputation::ReputationRecord;
use crate::risk::CircuitBreakerState;

/// Coarse classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed parameters, rejected before any state change
    Validation,
    /// Operation illegal in the entity's current state
    StateConflict,
    /// Insufficient stake, collateral, or reputation
    Economic,
    /// Duplicate cross-chain delivery (absorbed, never surfaced as failure)
    Consistency,
    /// Cross-chain delivery failed after all retries
    Transport,
    /// Circuit breaker tripped or component paused
    SystemicRisk,
    /// Price data missing or stale (fails closed)
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid claim parameters: {0}")]
    InvalidClaimParameters(String),

    #[error("Invalid loan parameters: {0}")]
    InvalidLoanParameters(String),

    #[error("Invalid governance activity: {0}")]
    InvalidGovernanceActivity(String),

    #[error("Invalid cross-chain message: {0}")]
    InvalidMessage(String),

    #[error("Invalid feed update: {0}")]
    InvalidFeedUpdate(String),

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    #[error("Auction not found: {0}")]
    AuctionNotFound(String),

    #[error("{actor} is not authorized to {action}")]
    Unauthorized { actor: String, action: String },

    #[error("Claim is not challengeable: {reason}")]
    ClaimNotChallengeable { reason: String },

    #[error("Claim {0} is already finalized")]
    ClaimAlreadyFinalized(String),

    #[error("Claim {0} has an open challenge")]
    ClaimAlreadyChallenged(String),

    #[error("Claim {0} has no open challenge")]
    ClaimNotChallenged(String),

    #[error("Optimism window open until {until}")]
    OptimismWindowOpen { until: DateTime<Utc> },

    #[error("Resolution window open until {until}")]
    ResolutionWindowOpen { until: DateTime<Utc> },

    #[error("Loan {loan_id} is not active")]
    LoanNotActive { loan_id: String },

    #[error("Position is healthy (health factor {health_factor_bps} bps)")]
    PositionHealthy { health_factor_bps: u128 },

    #[error("Liquidation grace period active until {until}")]
    GracePeriodActive { until: DateTime<Utc> },

    #[error("Loan {0} already has a liquidation auction")]
    LiquidationInProgress(String),

    #[error("Auction {0} is already settled")]
    AuctionAlreadySettled(String),

    #[error("Circuit breaker is not tripped")]
    BreakerNotTripped,

    #[error("Score sync cooldown active until {until}")]
    SyncCooldownActive { until: DateTime<Utc> },

    #[error("Challenger stake must equal {required}, provided {provided}")]
    InvalidChallengerStake { required: u128, provided: u128 },

    #[error("Insufficient reputation: tier {tier} allows {max_ltv_bps} bps LTV, requested {requested_ltv_bps} bps")]
    InsufficientReputation {
        tier: String,
        max_ltv_bps: u32,
        requested_ltv_bps: u128,
    },

    #[error("Borrower {subject} is on probation until {until}")]
    BorrowerOnProbation { subject: String, until: DateTime<Utc> },

    #[error("Borrower {0} is blacklisted")]
    BorrowerBlacklisted(String),

    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: String,
        required: u128,
        available: u128,
    },

    #[error("Duplicate delivery of nonce {nonce} for {subject}")]
    DuplicateDelivery { subject: String, nonce: u64 },

    #[error("Cross-chain delivery to {destination} failed after {attempts} attempts: {last_error}")]
    CrossChainDeliveryFailed {
        destination: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Circuit breaker tripped")]
    CircuitBreakerTripped,

    #[error("{0} is paused")]
    ComponentPaused(String),

    #[error("No price available for {0}")]
    PriceUnavailable(String),

    #[error("Price for {asset} is stale ({age_secs}s old)")]
    StalePrice { asset: String, age_secs: i64 },

    #[error("No writable {0} feed is wired")]
    FeedNotWired(&'static str),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::Economic => "economic",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Transport => "transport",
            ErrorKind::SystemicRisk => "systemic_risk",
            ErrorKind::Oracle => "oracle",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            InvalidClaimParameters(_)
            | InvalidLoanParameters(_)
            | InvalidGovernanceActivity(_)
            | InvalidMessage(_)
            | InvalidFeedUpdate(_)
            | ClaimNotFound(_)
            | LoanNotFound(_)
            | AuctionNotFound(_)
            | Unauthorized { .. }
            | Overflow(_) => ErrorKind::Validation,

            ClaimNotChallengeable { .. }
            | ClaimAlreadyFinalized(_)
            | ClaimAlreadyChallenged(_)
            | ClaimNotChallenged(_)
            | OptimismWindowOpen { .. }
            | ResolutionWindowOpen { .. }
            | LoanNotActive { .. }
            | PositionHealthy { .. }
            | GracePeriodActive { .. }
            | LiquidationInProgress(_)
            | AuctionAlreadySettled(_)
            | BreakerNotTripped
            | SyncCooldownActive { .. } => ErrorKind::StateConflict,

            InvalidChallengerStake { .. }
            | InsufficientReputation { .. }
            | BorrowerOnProbation { .. }
            | BorrowerBlacklisted(_)
            | InsufficientFunds { .. } => ErrorKind::Economic,

            DuplicateDelivery { .. } => ErrorKind::Consistency,

            CrossChainDeliveryFailed { .. } => ErrorKind::Transport,

            CircuitBreakerTripped | ComponentPaused(_) => ErrorKind::SystemicRisk,

            PriceUnavailable(_) | StalePrice { .. } | FeedNotWired(_) => ErrorKind::Oracle,
        }
    }

    /// Errors that are accepted idempotently instead of reported
    pub fn is_absorbed(&self) -> bool {
        self.kind() == ErrorKind::Consistency
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Authoritative state returned alongside a rejection
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum StateSnapshot {
    Claim(Claim),
    Loan(Loan),
    Auction(LiquidationAuction),
    Breaker(CircuitBreakerState),
    Reputation(ReputationRecord),
    None,
}

/// A rejected operation: what went wrong plus the state as it stands now
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct Rejection {
    pub error: EngineError,
    pub snapshot: StateSnapshot,
}

impl Rejection {
    pub fn new(error: EngineError, snapshot: StateSnapshot) -> Self {
        Self { error, snapshot }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<EngineError> for Rejection {
    fn from(error: EngineError) -> Self {
        Self {
            error,
            snapshot: StateSnapshot::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::InvalidClaimParameters("gap".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::AuctionAlreadySettled("a".into()).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            EngineError::CircuitBreakerTripped.kind(),
            ErrorKind::SystemicRisk
        );
        assert_eq!(
            EngineError::InvalidChallengerStake {
                required: 2,
                provided: 1
            }
            .kind(),
            ErrorKind::Economic
        );
    }

    #[test]
    fn test_duplicate_delivery_is_absorbed() {
        let err = EngineError::DuplicateDelivery {
            subject: "0xabc".into(),
            nonce: 1,
        };
        assert!(err.is_absorbed());
        assert!(!EngineError::CircuitBreakerTripped.is_absorbed());
    }
}
