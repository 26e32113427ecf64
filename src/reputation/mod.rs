//! Temporal reputation
//!
//! Scores subjects from finalized holdings claims, loan history, mirrored
//! remote scores, and governance activity. Scores decay lazily and are cut by
//! slashes; they are never deleted (blacklisting is a soft flag).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ ScoringEngine   │────►│ ReputationStore  │◄────│ SlashEvent      │
//! │ (pure, integer) │     │ (decay, slash)   │     │ (severity tier) │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                                  │
//!                                  ▼ ReputationReader
//!                          ┌──────────────────┐
//!                          │ TierTable        │
//!                          │ (LTV, rate,      │
//!                          │  grace period)   │
//!                          └──────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - Scores live in [0, 1000]; five weighted factors summing to 100
//! - Holdings contribution halves every decay period, applied at read time
//! - Recomputation can only raise a score; slashes and decay lower it
//! - A slash also scales future recomputes until its probation ends

mod score;
mod slash;
mod store;
mod tier;

pub use score::{
    GovernanceActivity, HoldingsEvidence, LoanHistory, MAX_SCORE, ScoreBreakdown, ScoreWeights,
    ScoringEngine, ScoringEvidence,
};
pub use slash::{SeverityPolicy, SlashEvent, SlashReason, SlashSeverity, SlashSeverityTable};
pub use store::{CreditStanding, RemoteScore, ReputationReader, ReputationRecord, ReputationStore, ScoreUpdate};
pub use tier::{ReputationTier, TierPolicy, TierTable};
