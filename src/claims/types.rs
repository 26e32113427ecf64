use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reputation::HoldingsEvidence;

/// One `(block, balance)` observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSample {
    pub block: u64,
    pub balance: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimResolution {
    /// No challenge within the optimism window
    AutoAccepted,
    /// Challenged, and the claimant's proof verified
    ProofUpheld,
    /// Challenged, and the claimant's proof failed verification
    ProofRejected,
    /// Challenged, and no proof arrived by the resolution deadline
    DeadlineExpired,
}

impl ClaimResolution {
    /// Whether the claim is treated as true
    pub fn is_accepted(&self) -> bool {
        matches!(self, ClaimResolution::AutoAccepted | ClaimResolution::ProofUpheld)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "resolution", rename_all = "snake_case")]
pub enum ClaimStatus {
    Submitted,
    Challenged,
    Finalized(ClaimResolution),
}

impl ClaimStatus {
    /// Position in the lifecycle; transitions only ever increase it
    pub fn rank(&self) -> u8 {
        match self {
            ClaimStatus::Submitted => 0,
            ClaimStatus::Challenged => 1,
            ClaimStatus::Finalized(_) => 2,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ClaimStatus::Finalized(_))
    }
}

/// Caller-supplied claim parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimParams {
    pub claimant: String,
    /// Minimum balance held at every sample, in wei
    pub min_balance: u128,
    pub start_block: u64,
    pub end_block: u64,
    pub sample_blocks: Vec<u64>,
    /// Hex SHA-256 Merkle root over the ordered samples
    pub merkle_root: String,
    /// Stake in wei
    pub stake: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub claim_id: String,
    pub challenger: String,
    pub stake: u128,
    /// Hex proof bytes, once submitted
    pub dispute_proof: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolution_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub claimant: String,
    pub min_balance: u128,
    pub start_block: u64,
    pub end_block: u64,
    pub sample_blocks: Vec<u64>,
    pub merkle_root: String,
    pub stake: u128,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    /// End of the optimism window
    pub challenge_deadline: DateTime<Utc>,
    pub challenge: Option<Challenge>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn challenger(&self) -> Option<&str> {
        self.challenge.as_ref().map(|c| c.challenger.as_str())
    }

    pub fn resolution(&self) -> Option<ClaimResolution> {
        match self.status {
            ClaimStatus::Finalized(resolution) => Some(resolution),
            _ => None,
        }
    }

    /// Scoring evidence for an accepted claim
    pub fn holdings_evidence(&self) -> Option<HoldingsEvidence> {
        let resolution = self.resolution()?;
        if !resolution.is_accepted() {
            return None;
        }
        Some(HoldingsEvidence {
            claim_id: self.id.clone(),
            min_balance: self.min_balance,
            start_block: self.start_block,
            end_block: self.end_block,
            accepted_at: self.finalized_at?,
        })
    }
}
