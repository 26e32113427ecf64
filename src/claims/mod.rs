//! Optimistic temporal-ownership claims
//!
//! ```text
//! submit ──► Submitted ──(window elapses)──► Finalized(AutoAccepted)
//!                │
//!                └─challenge─► Challenged ──proof ok──► Finalized(ProofUpheld)
//!                                   │
//!                                   ├─proof bad──────► Finalized(ProofRejected)
//!                                   └─deadline/late──► Finalized(DeadlineExpired)
//! ```
//!
//! Stakes sit in a per-claim escrow account on the [`StakeLedger`](crate::ledger::StakeLedger)
//! until finalization pays them out.

mod evidence;
mod machine;
mod types;

pub use evidence::{ClaimAudit, public_input_hash};
pub use machine::{ClaimDisputeMachine, ClaimOutcome};
pub use types::{BalanceSample, Challenge, Claim, ClaimParams, ClaimResolution, ClaimStatus};
