//! Slash severity tiers and recorded slash events
//!
//! Default severity follows the shortfall ratio of the defaulted loan:
//! below 10% is minor, 10% through 50% inclusive is major, above 50% is a full
//! default that also blacklists the subject.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlashSeverity {
    Minor,
    Major,
    Full,
}

/// What one severity tier does to a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    /// Fraction of the current score removed
    pub slash_bps: u32,
    /// New borrows blocked for this long
    pub probation_days: i64,
    pub blacklist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashSeverityTable {
    /// Shortfall ratios strictly below this are minor
    pub minor_ratio_bps: u32,
    /// Shortfall ratios up to and including this are major
    pub major_ratio_bps: u32,
    pub minor: SeverityPolicy,
    pub major: SeverityPolicy,
    pub full: SeverityPolicy,
}

impl Default for SlashSeverityTable {
    fn default() -> Self {
        Self {
            minor_ratio_bps: 1_000,
            major_ratio_bps: 5_000,
            minor: SeverityPolicy {
                slash_bps: 2_000,
                probation_days: 182,
                blacklist: false,
            },
            major: SeverityPolicy {
                slash_bps: 5_000,
                probation_days: 365,
                blacklist: false,
            },
            full: SeverityPolicy {
                slash_bps: 10_000,
                probation_days: 0,
                blacklist: true,
            },
        }
    }
}

impl SlashSeverityTable {
    pub fn validate(&self) -> Result<(), String> {
        if self.minor_ratio_bps > self.major_ratio_bps {
            return Err("minor ratio boundary exceeds major boundary".to_string());
        }
        let tiers = [self.minor, self.major, self.full];
        if tiers.iter().any(|p| p.slash_bps > 10_000 || p.probation_days < 0) {
            return Err("slash bps must be <= 10000 and probation non-negative".to_string());
        }
        if !(self.minor.slash_bps <= self.major.slash_bps && self.major.slash_bps <= self.full.slash_bps)
        {
            return Err("slash bps must not decrease with severity".to_string());
        }
        Ok(())
    }

    pub fn policy(&self, severity: SlashSeverity) -> SeverityPolicy {
        match severity {
            SlashSeverity::Minor => self.minor,
            SlashSeverity::Major => self.major,
            SlashSeverity::Full => self.full,
        }
    }

    /// Classify a default by `shortfall / debt`, compared exactly without rounding
    pub fn classify(&self, shortfall: u128, debt: u128) -> SlashSeverity {
        if debt == 0 || shortfall >= debt {
            return if debt == 0 && shortfall == 0 {
                SlashSeverity::Minor
            } else {
                SlashSeverity::Full
            };
        }
        let scaled = shortfall.saturating_mul(10_000);
        if scaled < debt.saturating_mul(self.minor_ratio_bps as u128) {
            SlashSeverity::Minor
        } else if scaled <= debt.saturating_mul(self.major_ratio_bps as u128) {
            SlashSeverity::Major
        } else {
            SlashSeverity::Full
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlashReason {
    /// Liquidated loan; ratio is shortfall over debt in bps
    LoanDefault { loan_id: String, shortfall_ratio_bps: u32 },
    /// Claim disproven or left unproven at the resolution deadline
    FraudulentClaim { claim_id: String },
    /// Slash mirrored from another chain
    Remote { source_chain: String, nonce: u64 },
    /// Operator action
    Manual { operator: String },
}

impl SlashReason {
    pub fn description(&self) -> String {
        match self {
            SlashReason::LoanDefault {
                loan_id,
                shortfall_ratio_bps,
            } => format!("default on {} ({} bps shortfall)", loan_id, shortfall_ratio_bps),
            SlashReason::FraudulentClaim { claim_id } => format!("fraudulent claim {}", claim_id),
            SlashReason::Remote { source_chain, nonce } => {
                format!("remote slash from {} #{}", source_chain, nonce)
            }
            SlashReason::Manual { operator } => format!("manual action by {}", operator),
        }
    }
}

/// A recorded slash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub id: String,
    pub subject: String,
    pub reason: SlashReason,
    pub severity_bps: u32,
    pub score_before: u32,
    pub score_after: u32,
    pub slashed_at: DateTime<Utc>,
    pub probation_until: Option<DateTime<Utc>>,
    pub blacklisted: bool,
}

impl SlashEvent {
    pub(crate) fn new(
        subject: &str,
        reason: SlashReason,
        policy: SeverityPolicy,
        score_before: u32,
        score_after: u32,
        at: DateTime<Utc>,
    ) -> Self {
        let id = format!("slash_{}_{}", subject, uuid::Uuid::new_v4().simple());
        let probation_until =
            (policy.probation_days > 0).then(|| at + Duration::days(policy.probation_days));

        Self {
            id,
            subject: subject.to_string(),
            reason,
            severity_bps: policy.slash_bps,
            score_before,
            score_after,
            slashed_at: at,
            probation_until,
            blacklisted: policy.blacklist,
        }
    }

    pub fn points_deducted(&self) -> u32 {
        self.score_before - self.score_after
    }
}
