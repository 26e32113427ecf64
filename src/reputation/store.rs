//! Reputation store
//!
//! One record per subject, created lazily on first evidence and never
//! deleted. Decay is evaluated lazily at the next read or write, from a
//! checkpoint, so replaying the same operations at the same times yields the
//! same records.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::score::{
    GovernanceActivity, HoldingsEvidence, LoanHistory, MAX_SCORE, ScoreBreakdown, ScoringEngine,
    ScoringEvidence,
};
use super::slash::{SeverityPolicy, SlashEvent, SlashReason, SlashSeverity, SlashSeverityTable};
use super::tier::{ReputationTier, TierPolicy, TierTable};
use crate::config::ReputationConfig;
use crate::error::{EngineError, EngineResult};

const FULL_RETENTION_BPS: u32 = 10_000;

/// A score mirrored from another chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteScore {
    pub score: u32,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub subject: String,
    pub score: u32,
    pub tier: ReputationTier,
    pub breakdown: ScoreBreakdown,
    /// Share of `score` that came from holdings evidence and is subject to decay
    pub holdings_points: u32,
    pub first_evidence_at: DateTime<Utc>,
    pub last_decay_at: DateTime<Utc>,
    /// Scale applied to recomputed scores while a slash is in force
    pub retention_bps: u32,
    pub holdings: Vec<HoldingsEvidence>,
    pub governance: GovernanceActivity,
    pub remote_scores: BTreeMap<String, RemoteScore>,
    pub slash_history: Vec<SlashEvent>,
    pub probation_until: Option<DateTime<Utc>>,
    pub is_blacklisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl ReputationRecord {
    pub fn new(subject: &str, now: DateTime<Utc>) -> Self {
        Self {
            subject: subject.to_string(),
            score: 0,
            tier: ReputationTier::Unrated,
            breakdown: ScoreBreakdown::default(),
            holdings_points: 0,
            first_evidence_at: now,
            last_decay_at: now,
            retention_bps: FULL_RETENTION_BPS,
            holdings: Vec::new(),
            governance: GovernanceActivity::default(),
            remote_scores: BTreeMap::new(),
            slash_history: Vec::new(),
            probation_until: None,
            is_blacklisted: false,
            updated_at: now,
        }
    }

    pub fn age_months(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_evidence_at).num_days().max(0) / 30
    }

    pub fn on_probation(&self, now: DateTime<Utc>) -> bool {
        self.probation_until.is_some_and(|until| now < until)
    }
}

/// Halve the holdings share of the score once per whole elapsed decay period
///
/// Returns true if the record changed.
pub(crate) fn apply_decay(record: &mut ReputationRecord, now: DateTime<Utc>, period_secs: i64) -> bool {
    let elapsed = (now - record.last_decay_at).num_seconds();
    if period_secs <= 0 || elapsed < period_secs {
        return false;
    }

    let periods = elapsed / period_secs;
    let decayed = if periods >= 32 {
        0
    } else {
        record.holdings_points >> periods
    };
    let lost = record.holdings_points - decayed;

    record.score = record.score.saturating_sub(lost);
    record.holdings_points = decayed;
    record.last_decay_at += Duration::seconds(periods * period_secs);
    true
}

/// Result of a recomputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub subject: String,
    pub previous: u32,
    pub score: u32,
    pub tier: ReputationTier,
    pub breakdown: ScoreBreakdown,
}

/// What the credit side needs to know about a borrower
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditStanding {
    pub subject: String,
    pub score: u32,
    pub policy: TierPolicy,
    pub probation_until: Option<DateTime<Utc>>,
    pub is_blacklisted: bool,
    pub age_months: i64,
}

impl CreditStanding {
    /// Blacklist and probation block new borrows only
    pub fn ensure_can_borrow(&self, now: DateTime<Utc>) -> EngineResult<()> {
        if self.is_blacklisted {
            return Err(EngineError::BorrowerBlacklisted(self.subject.clone()));
        }
        if let Some(until) = self.probation_until {
            if now < until {
                return Err(EngineError::BorrowerOnProbation {
                    subject: self.subject.clone(),
                    until,
                });
            }
        }
        Ok(())
    }
}

/// Read port the credit engine depends on
pub trait ReputationReader: Send + Sync {
    fn standing(&self, subject: &str, now: DateTime<Utc>) -> CreditStanding;
}

pub struct ReputationStore {
    records: DashMap<String, ReputationRecord>,
    scorer: ScoringEngine,
    severity: SlashSeverityTable,
    tiers: TierTable,
    decay_period_secs: i64,
}

impl ReputationStore {
    pub fn new(config: &ReputationConfig) -> Self {
        let decay_period_secs = config.decay_period().num_seconds();
        Self {
            records: DashMap::new(),
            scorer: ScoringEngine::new(config.weights, decay_period_secs, config.blocks_per_year),
            severity: config.severity.clone(),
            tiers: config.tiers.clone(),
            decay_period_secs,
        }
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn severity_table(&self) -> &SlashSeverityTable {
        &self.severity
    }

    /// Lazy housekeeping: decay, probation expiry, and tier
    fn refresh(&self, record: &mut ReputationRecord, now: DateTime<Utc>) {
        if apply_decay(record, now, self.decay_period_secs) {
            record.updated_at = now;
        }
        if record.probation_until.is_some_and(|until| now >= until) {
            record.probation_until = None;
            if !record.is_blacklisted {
                record.retention_bps = FULL_RETENTION_BPS;
            }
        }
        record.score = record.score.min(MAX_SCORE);
        record.tier = self.tiers.tier_for(record.score).tier;
    }

    /// Current record with decay applied, if the subject has any evidence
    pub fn get(&self, subject: &str, now: DateTime<Utc>) -> Option<ReputationRecord> {
        let mut record = self.records.get_mut(subject)?;
        self.refresh(&mut record, now);
        Some(record.clone())
    }

    /// Like [`get`](Self::get) but returns an empty record for unknown subjects without creating one
    pub fn snapshot(&self, subject: &str, now: DateTime<Utc>) -> ReputationRecord {
        self.get(subject, now)
            .unwrap_or_else(|| ReputationRecord::new(subject, now))
    }

    fn with_record<T>(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut ReputationRecord) -> T,
    ) -> T {
        let mut entry = self
            .records
            .entry(subject.to_string())
            .or_insert_with(|| ReputationRecord::new(subject, now));
        self.refresh(&mut entry, now);
        let out = f(&mut *entry);
        entry.tier = self.tiers.tier_for(entry.score).tier;
        entry.updated_at = now;
        out
    }

    /// Record an accepted holdings claim. Duplicate claim ids are ignored.
    pub fn add_holdings(&self, subject: &str, evidence: HoldingsEvidence, now: DateTime<Utc>) {
        self.with_record(subject, now, |record| {
            if record.holdings.iter().all(|h| h.claim_id != evidence.claim_id) {
                record.holdings.push(evidence);
            }
        });
    }

    pub fn record_governance(&self, subject: &str, activity: GovernanceActivity, now: DateTime<Utc>) {
        self.with_record(subject, now, |record| {
            let g = &mut record.governance;
            g.votes_cast = g.votes_cast.saturating_add(activity.votes_cast);
            g.eligible_votes = g.eligible_votes.saturating_add(activity.eligible_votes);
            g.proposals = g.proposals.saturating_add(activity.proposals);
        });
    }

    pub fn apply_remote_score(&self, subject: &str, source_chain: &str, score: u32, now: DateTime<Utc>) {
        self.with_record(subject, now, |record| {
            record.remote_scores.insert(
                source_chain.to_string(),
                RemoteScore {
                    score: score.min(MAX_SCORE),
                    synced_at: now,
                },
            );
        });
    }

    /// Re-score a subject from its stored evidence plus loan history
    ///
    /// The result can only raise the score, scaled by any retention penalty
    /// from slashes still in force. Blacklisted subjects stay where they are.
    pub fn recompute(&self, subject: &str, loans: &LoanHistory, now: DateTime<Utc>) -> ScoreUpdate {
        self.with_record(subject, now, |record| {
            let evidence = ScoringEvidence {
                holdings: record.holdings.clone(),
                loans: loans.clone(),
                remote_scores: record.remote_scores.values().map(|r| r.score).collect(),
                governance: record.governance.clone(),
                as_of: now,
            };
            let breakdown = self.scorer.compute_score(subject, &evidence);
            let previous = record.score;
            record.breakdown = breakdown;

            if !record.is_blacklisted {
                let retention = record.retention_bps as u64;
                let candidate = (breakdown.overall as u64 * retention / 10_000) as u32;
                if candidate > record.score {
                    let sybil = self.scorer.sybil_points(&breakdown) as u64 * retention / 10_000;
                    record.score = candidate.min(MAX_SCORE);
                    record.holdings_points = (sybil as u32).min(record.score);
                    record.last_decay_at = self
                        .scorer
                        .decay_anchor(&record.holdings, now)
                        .unwrap_or(now);
                }
            }

            debug!(
                subject = %subject,
                previous,
                score = record.score,
                overall = breakdown.overall,
                "Recomputed reputation"
            );

            ScoreUpdate {
                subject: subject.to_string(),
                previous,
                score: record.score,
                tier: self.tiers.tier_for(record.score).tier,
                breakdown,
            }
        })
    }

    pub fn slash(
        &self,
        subject: &str,
        severity: SlashSeverity,
        reason: SlashReason,
        now: DateTime<Utc>,
    ) -> SlashEvent {
        self.apply_policy(subject, self.severity.policy(severity), reason, now)
    }

    /// Slash by an explicit fraction, taking probation and blacklist from the
    /// highest severity tier the fraction reaches
    pub fn slash_bps(
        &self,
        subject: &str,
        severity_bps: u32,
        reason: SlashReason,
        now: DateTime<Utc>,
    ) -> SlashEvent {
        let bps = severity_bps.min(10_000);
        let mut policy = [self.severity.full, self.severity.major, self.severity.minor]
            .into_iter()
            .find(|p| bps >= p.slash_bps)
            .unwrap_or(self.severity.minor);
        policy.slash_bps = bps;
        self.apply_policy(subject, policy, reason, now)
    }

    pub fn blacklist(&self, subject: &str, reason: SlashReason, now: DateTime<Utc>) -> SlashEvent {
        self.apply_policy(subject, self.severity.full, reason, now)
    }

    fn apply_policy(
        &self,
        subject: &str,
        policy: SeverityPolicy,
        reason: SlashReason,
        now: DateTime<Utc>,
    ) -> SlashEvent {
        self.with_record(subject, now, |record| {
            let bps = policy.slash_bps.min(10_000) as u64;
            let before = record.score;
            let deducted = (before as u64 * bps / 10_000) as u32;

            record.score = before - deducted;
            record.holdings_points -= (record.holdings_points as u64 * bps / 10_000) as u32;
            record.holdings_points = record.holdings_points.min(record.score);
            record.retention_bps = (record.retention_bps as u64 * (10_000 - bps) / 10_000) as u32;

            if policy.blacklist {
                record.is_blacklisted = true;
                record.retention_bps = 0;
            }

            let event = SlashEvent::new(subject, reason, policy, before, record.score, now);
            if let Some(until) = event.probation_until {
                record.probation_until = Some(record.probation_until.map_or(until, |p| p.max(until)));
            }
            record.slash_history.push(event.clone());

            if event.blacklisted {
                warn!(
                    subject = %subject,
                    reason = %event.reason.description(),
                    "Subject blacklisted"
                );
            } else {
                info!(
                    subject = %subject,
                    severity_bps = event.severity_bps,
                    score_before = before,
                    score_after = record.score,
                    "Applied slash"
                );
            }

            event
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ReputationReader for ReputationStore {
    fn standing(&self, subject: &str, now: DateTime<Utc>) -> CreditStanding {
        let record = self.snapshot(subject, now);
        CreditStanding {
            subject: subject.to_string(),
            score: record.score,
            policy: self.tiers.tier_for(record.score),
            probation_until: record.probation_until.filter(|until| now < *until),
            is_blacklisted: record.is_blacklisted,
            age_months: record.age_months(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WEI_PER_ETH;

    fn store() -> ReputationStore {
        ReputationStore::new(&ReputationConfig::default())
    }

    fn strong_holding(now: DateTime<Utc>) -> HoldingsEvidence {
        HoldingsEvidence {
            claim_id: "claim-1".into(),
            min_balance: 15 * WEI_PER_ETH,
            start_block: 0,
            end_block: 2_628_000,
            accepted_at: now,
        }
    }

    #[test]
    fn test_recompute_raises_score() {
        let store = store();
        let now = Utc::now();
        store.add_holdings("0xa", strong_holding(now), now);

        let update = store.recompute("0xa", &LoanHistory::default(), now);
        // 275 neutral + 200 sybil
        assert_eq!(update.previous, 0);
        assert_eq!(update.score, 475);
        assert_eq!(update.tier, ReputationTier::Bronze);
    }

    #[test]
    fn test_decay_is_lazy_and_checkpointed() {
        let store = store();
        let now = Utc::now();
        store.add_holdings("0xa", strong_holding(now), now);
        store.recompute("0xa", &LoanHistory::default(), now);

        let later = now + Duration::days(730);
        let record = store.get("0xa", later).unwrap();
        assert_eq!(record.holdings_points, 100);
        assert_eq!(record.score, 375);
        assert_eq!(record.last_decay_at, later);

        // Reading again at the same time changes nothing
        assert_eq!(store.get("0xa", later).unwrap(), record);
    }

    #[test]
    fn test_later_recompute_keeps_evidence_decay_clock() {
        let store = store();
        let t0 = Utc::now();
        store.add_holdings("0xa", strong_holding(t0), t0);
        store.recompute("0xa", &LoanHistory::default(), t0);

        // A vote inside the first period raises the score
        let t1 = t0 + Duration::days(700);
        store.record_governance(
            "0xa",
            GovernanceActivity {
                votes_cast: 10,
                eligible_votes: 10,
                proposals: 4,
            },
            t1,
        );
        let update = store.recompute("0xa", &LoanHistory::default(), t1);
        assert!(update.score > update.previous);
        let record = store.get("0xa", t1).unwrap();
        assert_eq!(record.holdings_points, 200);
        assert_eq!(record.last_decay_at, t0);

        // The holding still halves 730 days after it was accepted
        let t2 = t0 + Duration::days(731);
        let record = store.get("0xa", t2).unwrap();
        assert_eq!(record.holdings_points, 100);
        assert_eq!(record.score, update.score - 100);
        assert_eq!(record.last_decay_at, t0 + Duration::days(730));
    }

    #[test]
    fn test_slash_is_not_undone_by_recompute() {
        let store = store();
        let now = Utc::now();
        store.add_holdings("0xa", strong_holding(now), now);
        store.recompute("0xa", &LoanHistory::default(), now);

        let event = store.slash(
            "0xa",
            SlashSeverity::Minor,
            SlashReason::Manual {
                operator: "ops".into(),
            },
            now,
        );
        assert_eq!(event.score_before, 475);
        assert_eq!(event.score_after, 380);

        let update = store.recompute("0xa", &LoanHistory::default(), now);
        assert_eq!(update.score, 380);

        let standing = store.standing("0xa", now);
        assert!(standing.ensure_can_borrow(now).is_err());
        assert!(standing.ensure_can_borrow(now + Duration::days(183)).is_ok());
    }

    #[test]
    fn test_probation_expiry_restores_retention() {
        let store = store();
        let now = Utc::now();
        store.add_holdings("0xa", strong_holding(now), now);
        store.recompute("0xa", &LoanHistory::default(), now);
        store.slash(
            "0xa",
            SlashSeverity::Major,
            SlashReason::Manual {
                operator: "ops".into(),
            },
            now,
        );

        let after = now + Duration::days(366);
        let record = store.get("0xa", after).unwrap();
        assert_eq!(record.retention_bps, 10_000);
        assert!(record.probation_until.is_none());
    }

    #[test]
    fn test_full_slash_blacklists() {
        let store = store();
        let now = Utc::now();
        store.add_holdings("0xa", strong_holding(now), now);
        store.recompute("0xa", &LoanHistory::default(), now);

        let event = store.slash(
            "0xa",
            SlashSeverity::Full,
            SlashReason::FraudulentClaim {
                claim_id: "claim-1".into(),
            },
            now,
        );
        assert!(event.blacklisted);

        let record = store.get("0xa", now).unwrap();
        assert_eq!(record.score, 0);
        assert!(record.is_blacklisted);

        // Recompute cannot lift a blacklisted subject
        assert_eq!(store.recompute("0xa", &LoanHistory::default(), now).score, 0);
        assert_eq!(
            store.standing("0xa", now).ensure_can_borrow(now),
            Err(EngineError::BorrowerBlacklisted("0xa".into()))
        );
    }

    #[test]
    fn test_slash_bps_picks_policy() {
        let store = store();
        let now = Utc::now();
        let event = store.slash_bps(
            "0xb",
            5_000,
            SlashReason::Remote {
                source_chain: "arbitrum".into(),
                nonce: 1,
            },
            now,
        );
        assert_eq!(event.severity_bps, 5_000);
        assert_eq!(event.probation_until, Some(now + Duration::days(365)));
        assert!(!event.blacklisted);
    }

    #[test]
    fn test_unknown_subject_not_created_on_read() {
        let store = store();
        let now = Utc::now();
        assert_eq!(store.standing("0xnobody", now).score, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_scores_feed_cross_chain_factor() {
        let store = store();
        let now = Utc::now();
        store.apply_remote_score("0xa", "arbitrum", 1_000, now);
        let update = store.recompute("0xa", &LoanHistory::default(), now);
        assert_eq!(update.breakdown.cross_chain_reputation, 1_000);
        assert_eq!(update.score, 425);
    }
}
