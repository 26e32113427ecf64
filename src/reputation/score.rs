//! Deterministic reputation scoring
//!
//! Integer-only so independent indexers agree bit-for-bit. Every factor is a
//! value in [0, 1000]; `overall = Σ(factor × weight) / 100`, floor-rounded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WEI_PER_ETH;

/// Upper bound of every score and factor
pub const MAX_SCORE: u32 = 1_000;

/// Neutral factor value used when a subject has no history for it
const NEUTRAL_FACTOR: u32 = 500;

/// Points per doubling of held balance (in whole tokens)
const BALANCE_POINTS_PER_DOUBLING: u32 = 250;

/// Governance points per authored proposal
const PROPOSAL_POINTS: u32 = 50;

/// Fixed integer weights, summing to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub repayment: u32,
    pub collateral_utilization: u32,
    pub sybil_resistance: u32,
    pub cross_chain_reputation: u32,
    pub governance_participation: u32,
}

impl ScoreWeights {
    pub fn total(&self) -> u32 {
        self.repayment
            + self.collateral_utilization
            + self.sybil_resistance
            + self.cross_chain_reputation
            + self.governance_participation
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            repayment: 35,
            collateral_utilization: 20,
            sybil_resistance: 20,
            cross_chain_reputation: 15,
            governance_participation: 10,
        }
    }
}

/// A finalized, accepted temporal-ownership claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingsEvidence {
    pub claim_id: String,
    /// Minimum balance held, in wei
    pub min_balance: u128,
    pub start_block: u64,
    pub end_block: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Borrowing track record, supplied by the credit side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanHistory {
    pub loans_opened: u32,
    pub loans_repaid: u32,
    pub loans_liquidated: u32,
    pub total_borrowed: u128,
    pub total_repaid: u128,
    /// Sum of LTV (bps) at origination across opened loans
    pub cumulative_ltv_bps: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceActivity {
    pub votes_cast: u32,
    pub eligible_votes: u32,
    pub proposals: u32,
}

/// Everything the scorer looks at, evaluated as of `as_of`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEvidence {
    pub holdings: Vec<HoldingsEvidence>,
    pub loans: LoanHistory,
    /// Mirrored scores from remote replicas
    pub remote_scores: Vec<u32>,
    pub governance: GovernanceActivity,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub repayment: u32,
    pub collateral_utilization: u32,
    pub sybil_resistance: u32,
    pub cross_chain_reputation: u32,
    pub governance_participation: u32,
    pub overall: u32,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoreWeights,
    decay_period_secs: i64,
    blocks_per_year: u64,
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights, decay_period_secs: i64, blocks_per_year: u64) -> Self {
        Self {
            weights,
            decay_period_secs: decay_period_secs.max(1),
            blocks_per_year: blocks_per_year.max(1),
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Score a subject. Pure: the subject id is only used for tracing.
    pub fn compute_score(&self, subject: &str, evidence: &ScoringEvidence) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown {
            repayment: repayment_factor(&evidence.loans),
            collateral_utilization: utilization_factor(&evidence.loans),
            sybil_resistance: self.sybil_factor(&evidence.holdings, evidence.as_of),
            cross_chain_reputation: cross_chain_factor(&evidence.remote_scores),
            governance_participation: governance_factor(&evidence.governance),
            overall: 0,
        };
        breakdown.overall = self.weigh(&breakdown);

        tracing::trace!(
            subject = %subject,
            overall = breakdown.overall,
            sybil = breakdown.sybil_resistance,
            repayment = breakdown.repayment,
            "Computed score"
        );

        breakdown
    }

    fn weigh(&self, b: &ScoreBreakdown) -> u32 {
        let w = &self.weights;
        let sum = b.repayment as u64 * w.repayment as u64
            + b.collateral_utilization as u64 * w.collateral_utilization as u64
            + b.sybil_resistance as u64 * w.sybil_resistance as u64
            + b.cross_chain_reputation as u64 * w.cross_chain_reputation as u64
            + b.governance_participation as u64 * w.governance_participation as u64;
        ((sum / 100) as u32).min(MAX_SCORE)
    }

    /// Points the sybil factor contributes to `overall`
    pub fn sybil_points(&self, breakdown: &ScoreBreakdown) -> u32 {
        breakdown.sybil_resistance * self.weights.sybil_resistance / 100
    }

    /// Strongest single holdings claim, halved once per elapsed decay period
    fn sybil_factor(&self, holdings: &[HoldingsEvidence], as_of: DateTime<Utc>) -> u32 {
        self.strongest_holding(holdings, as_of)
            .map_or(0, |(points, _)| points)
    }

    /// Start of the current decay period of the holding that sets the sybil factor
    ///
    /// Periods are counted from the evidence's own `accepted_at`, not from the
    /// last recompute. On ties the later boundary wins, since the factor only
    /// drops once every tied holding has halved.
    pub fn decay_anchor(&self, holdings: &[HoldingsEvidence], as_of: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.strongest_holding(holdings, as_of)
            .map(|(_, anchor)| anchor)
    }

    fn strongest_holding(
        &self,
        holdings: &[HoldingsEvidence],
        as_of: DateTime<Utc>,
    ) -> Option<(u32, DateTime<Utc>)> {
        holdings
            .iter()
            .map(|h| {
                let raw = self.holdings_strength(h);
                let elapsed = (as_of - h.accepted_at).num_seconds().max(0);
                let halvings = elapsed / self.decay_period_secs;
                let points = if halvings >= 32 { 0 } else { raw >> halvings };
                let anchor = h.accepted_at + Duration::seconds(halvings * self.decay_period_secs);
                (points, anchor)
            })
            .max()
    }

    fn holdings_strength(&self, h: &HoldingsEvidence) -> u32 {
        let span = h.end_block.saturating_sub(h.start_block) as u128;
        let duration = (span * MAX_SCORE as u128 / self.blocks_per_year as u128)
            .min(MAX_SCORE as u128) as u32;

        let whole_tokens = h.min_balance / WEI_PER_ETH;
        let amount = (BALANCE_POINTS_PER_DOUBLING * (whole_tokens + 1).ilog2()).min(MAX_SCORE);

        (duration + amount) / 2
    }
}

fn repayment_factor(loans: &LoanHistory) -> u32 {
    let closed = loans.loans_repaid as u64 + loans.loans_liquidated as u64;
    if closed == 0 {
        return NEUTRAL_FACTOR;
    }
    (loans.loans_repaid as u64 * MAX_SCORE as u64 / closed) as u32
}

/// Lower average leverage scores higher
fn utilization_factor(loans: &LoanHistory) -> u32 {
    if loans.loans_opened == 0 {
        return NEUTRAL_FACTOR;
    }
    let avg_ltv_bps = (loans.cumulative_ltv_bps / loans.loans_opened as u128).min(10_000) as u32;
    (10_000 - avg_ltv_bps) / 10
}

fn cross_chain_factor(remote_scores: &[u32]) -> u32 {
    if remote_scores.is_empty() {
        return 0;
    }
    let sum: u64 = remote_scores.iter().map(|s| (*s).min(MAX_SCORE) as u64).sum();
    (sum / remote_scores.len() as u64) as u32
}

fn governance_factor(activity: &GovernanceActivity) -> u32 {
    let participation = if activity.eligible_votes == 0 {
        0
    } else {
        (activity.votes_cast.min(activity.eligible_votes) as u64 * 800
            / activity.eligible_votes as u64) as u32
    };
    let proposals = activity.proposals.saturating_mul(PROPOSAL_POINTS);
    participation.saturating_add(proposals).min(MAX_SCORE)
}
