//! Reputation tiers: score bands mapped to credit terms

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReputationTier {
    Unrated,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl fmt::Display for ReputationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Credit terms for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub tier: ReputationTier,
    pub min_score: u32,
    pub max_ltv_bps: u32,
    pub liquidation_threshold_bps: u32,
    /// Annual simple rate
    pub interest_rate_bps: u32,
    /// Time an unhealthy position has before it may be liquidated
    pub grace_period_secs: i64,
}

/// Tiers ordered by ascending `min_score`; the first starts at 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    tiers: Vec<TierPolicy>,
}

impl Default for TierTable {
    fn default() -> Self {
        let policy = |tier, min_score, max_ltv_bps, liquidation_threshold_bps, interest_rate_bps, grace_hours: i64| {
            TierPolicy {
                tier,
                min_score,
                max_ltv_bps,
                liquidation_threshold_bps,
                interest_rate_bps,
                grace_period_secs: grace_hours * 3600,
            }
        };

        Self {
            tiers: vec![
                policy(ReputationTier::Unrated, 0, 5_000, 6_000, 1_500, 0),
                policy(ReputationTier::Bronze, 300, 6_000, 7_000, 1_200, 1),
                policy(ReputationTier::Silver, 500, 7_000, 7_800, 900, 6),
                policy(ReputationTier::Gold, 700, 7_500, 8_300, 700, 24),
                policy(ReputationTier::Platinum, 850, 9_000, 9_500, 500, 72),
            ],
        }
    }
}

impl TierTable {
    pub fn new(tiers: Vec<TierPolicy>) -> Result<Self, String> {
        let table = Self { tiers };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), String> {
        let first = self.tiers.first().ok_or("tier table is empty")?;
        if first.min_score != 0 {
            return Err("lowest tier must start at score 0".to_string());
        }

        for policy in &self.tiers {
            if policy.max_ltv_bps >= policy.liquidation_threshold_bps {
                return Err(format!(
                    "{} max LTV must be below its liquidation threshold",
                    policy.tier
                ));
            }
            if policy.liquidation_threshold_bps > 10_000 || policy.grace_period_secs < 0 {
                return Err(format!("{} has out-of-range terms", policy.tier));
            }
        }

        for pair in self.tiers.windows(2) {
            if pair[1].min_score <= pair[0].min_score || pair[1].tier <= pair[0].tier {
                return Err("tiers must be strictly ascending".to_string());
            }
            if pair[1].max_ltv_bps < pair[0].max_ltv_bps
                || pair[1].grace_period_secs < pair[0].grace_period_secs
            {
                return Err(format!(
                    "{} terms must not be worse than {}",
                    pair[1].tier, pair[0].tier
                ));
            }
        }

        Ok(())
    }

    /// Highest tier whose `min_score` the score reaches
    pub fn tier_for(&self, score: u32) -> TierPolicy {
        self.tiers
            .iter()
            .rev()
            .find(|p| score >= p.min_score)
            .copied()
            .unwrap_or_else(|| self.bottom())
    }

    pub fn top(&self) -> TierPolicy {
        self.tiers.last().copied().unwrap_or_else(|| self.bottom())
    }

    fn bottom(&self) -> TierPolicy {
        self.tiers.first().copied().unwrap_or(TierPolicy {
            tier: ReputationTier::Unrated,
            min_score: 0,
            max_ltv_bps: 0,
            liquidation_threshold_bps: 1,
            interest_rate_bps: 0,
            grace_period_secs: 0,
        })
    }

    pub fn policies(&self) -> &[TierPolicy] {
        &self.tiers
    }
}
