//! Claim dispute state machine

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::evidence::{self, ClaimAudit, decode_root, public_input_hash};
use super::types::{Challenge, Claim, ClaimParams, ClaimResolution, ClaimStatus};
use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::capability::Pausable;
use crate::config::ClaimsConfig;
use crate::crypto::hash;
use crate::error::{EngineError, EngineResult};
use crate::external::{BalanceIndexer, ProofVerifier};
use crate::ledger::{ASSET_ETH, AccountKey, StakeLedger, Transfer, TransferType};

/// A finalized claim and whether it was accepted as true
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub claim: Claim,
    pub accepted: bool,
}

pub struct ClaimDisputeMachine {
    config: ClaimsConfig,
    claims: DashMap<String, Claim>,
    ledger: Arc<StakeLedger>,
    verifier: Arc<dyn ProofVerifier>,
    intake: Arc<dyn Pausable>,
    audit: Arc<AuditLogger>,
    sequence: AtomicU64,
}

impl ClaimDisputeMachine {
    pub fn new(
        config: ClaimsConfig,
        ledger: Arc<StakeLedger>,
        verifier: Arc<dyn ProofVerifier>,
        intake: Arc<dyn Pausable>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            config,
            claims: DashMap::new(),
            ledger,
            verifier,
            intake,
            audit,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn get(&self, claim_id: &str) -> Option<Claim> {
        self.claims.get(claim_id).map(|c| c.clone())
    }

    pub fn claims_by(&self, claimant: &str) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self
            .claims
            .iter()
            .filter(|c| c.claimant == claimant)
            .map(|c| c.clone())
            .collect();
        claims.sort_by_key(|c| c.created_at);
        claims
    }

    fn validate(&self, params: &ClaimParams) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidClaimParameters(msg));

        if params.claimant.trim().is_empty() {
            return invalid("claimant is empty".to_string());
        }
        if params.stake < self.config.user_stake {
            return invalid(format!(
                "stake {} is below USER_STAKE {}",
                params.stake, self.config.user_stake
            ));
        }
        if params.min_balance == 0 {
            return invalid("min_balance must be positive".to_string());
        }
        if decode_root(&params.merkle_root).is_none() {
            return invalid("merkle_root must be 32 bytes of hex".to_string());
        }

        let samples = &params.sample_blocks;
        if samples.len() < self.config.min_samples || samples.len() > self.config.max_samples {
            return invalid(format!(
                "{} samples outside [{}, {}]",
                samples.len(),
                self.config.min_samples,
                self.config.max_samples
            ));
        }
        for pair in samples.windows(2) {
            if pair[1] <= pair[0] {
                return invalid(format!("sample blocks not increasing at {}", pair[1]));
            }
            if pair[1] - pair[0] < self.config.min_sample_block_gap {
                return invalid(format!(
                    "gap {} between blocks {} and {} is below {}",
                    pair[1] - pair[0],
                    pair[0],
                    pair[1],
                    self.config.min_sample_block_gap
                ));
            }
        }
        let (first, last) = (samples[0], samples[samples.len() - 1]);
        if params.start_block > first || last > params.end_block {
            return invalid(format!(
                "samples [{}, {}] fall outside claimed range [{}, {}]",
                first, last, params.start_block, params.end_block
            ));
        }

        Ok(())
    }

    fn next_id(&self, params: &ClaimParams, now: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::new();
        data.extend_from_slice(params.claimant.as_bytes());
        data.extend_from_slice(params.merkle_root.as_bytes());
        data.extend_from_slice(&params.start_block.to_le_bytes());
        data.extend_from_slice(&params.end_block.to_le_bytes());
        data.extend_from_slice(&seq.to_le_bytes());
        data.extend_from_slice(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hex::encode(hash(&data))
    }

    /// Open a claim and escrow the claimant's stake
    pub fn submit(&self, params: ClaimParams, now: DateTime<Utc>) -> EngineResult<Claim> {
        self.intake.ensure_not_paused()?;
        self.validate(&params)?;

        let id = self.next_id(&params, now);
        let claim = Claim {
            id: id.clone(),
            claimant: params.claimant,
            min_balance: params.min_balance,
            start_block: params.start_block,
            end_block: params.end_block,
            sample_blocks: params.sample_blocks,
            merkle_root: params.merkle_root.to_lowercase(),
            stake: params.stake,
            status: ClaimStatus::Submitted,
            created_at: now,
            challenge_deadline: now + self.config.optimism_window(),
            challenge: None,
            finalized_at: None,
        };

        self.ledger.commit(
            &[Transfer::new(
                AccountKey::wallet(&claim.claimant),
                AccountKey::claim_escrow(&id),
                ASSET_ETH,
                claim.stake,
                TransferType::StakeEscrow,
            )],
            now,
        )?;
        self.claims.insert(id.clone(), claim.clone());

        info!(
            claim_id = %id,
            claimant = %claim.claimant,
            samples = claim.sample_blocks.len(),
            "Claim submitted"
        );
        self.audit.record(
            AuditEventType::ClaimSubmitted {
                claim_id: id,
                claimant: claim.claimant.clone(),
            },
            AuditSeverity::Info,
            now,
        );

        Ok(claim)
    }

    /// Dispute a claim inside its optimism window
    pub fn challenge(
        &self,
        claim_id: &str,
        challenger: &str,
        stake: u128,
        now: DateTime<Utc>,
    ) -> EngineResult<Claim> {
        let mut claim = self
            .claims
            .get_mut(claim_id)
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))?;

        let not_challengeable = |reason: &str| EngineError::ClaimNotChallengeable {
            reason: reason.to_string(),
        };
        match claim.status {
            ClaimStatus::Finalized(_) => return Err(not_challengeable("claim is finalized")),
            ClaimStatus::Challenged => return Err(not_challengeable("claim is already challenged")),
            ClaimStatus::Submitted => {}
        }
        if now >= claim.challenge_deadline {
            return Err(not_challengeable("optimism window has elapsed"));
        }
        if challenger == claim.claimant {
            return Err(EngineError::InvalidClaimParameters(
                "claimant cannot challenge their own claim".to_string(),
            ));
        }
        let required = self.config.challenger_stake();
        if stake != required {
            return Err(EngineError::InvalidChallengerStake {
                required,
                provided: stake,
            });
        }

        self.ledger.commit(
            &[Transfer::new(
                AccountKey::wallet(challenger),
                AccountKey::claim_escrow(claim_id),
                ASSET_ETH,
                stake,
                TransferType::StakeEscrow,
            )],
            now,
        )?;

        claim.status = ClaimStatus::Challenged;
        claim.challenge = Some(Challenge {
            claim_id: claim_id.to_string(),
            challenger: challenger.to_string(),
            stake,
            dispute_proof: None,
            opened_at: now,
            resolution_deadline: now + self.config.resolution_window(),
        });

        info!(claim_id = %claim_id, challenger = %challenger, "Claim challenged");
        self.audit.record(
            AuditEventType::ClaimChallenged {
                claim_id: claim_id.to_string(),
                challenger: challenger.to_string(),
            },
            AuditSeverity::Warning,
            now,
        );

        Ok(claim.clone())
    }

    /// Accept an unchallenged claim once the optimism window has elapsed
    pub fn auto_accept(&self, claim_id: &str, now: DateTime<Utc>) -> EngineResult<ClaimOutcome> {
        let mut claim = self
            .claims
            .get_mut(claim_id)
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))?;

        match claim.status {
            ClaimStatus::Finalized(_) => {
                return Err(EngineError::ClaimAlreadyFinalized(claim_id.to_string()));
            }
            ClaimStatus::Challenged => {
                return Err(EngineError::ClaimAlreadyChallenged(claim_id.to_string()));
            }
            ClaimStatus::Submitted => {}
        }
        if now < claim.challenge_deadline {
            return Err(EngineError::OptimismWindowOpen {
                until: claim.challenge_deadline,
            });
        }

        self.finalize(&mut claim, ClaimResolution::AutoAccepted, now)
    }

    /// Answer a challenge with a proof
    ///
    /// The deadline is inclusive. A proof after it is treated as absent and the
    /// claim is rejected.
    pub fn resolve_with_proof(
        &self,
        claim_id: &str,
        caller: &str,
        proof: &[u8],
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimOutcome> {
        let mut claim = self
            .claims
            .get_mut(claim_id)
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))?;

        let deadline = match (&claim.status, &claim.challenge) {
            (ClaimStatus::Finalized(_), _) => {
                return Err(EngineError::ClaimAlreadyFinalized(claim_id.to_string()));
            }
            (ClaimStatus::Challenged, Some(challenge)) => challenge.resolution_deadline,
            _ => return Err(EngineError::ClaimNotChallenged(claim_id.to_string())),
        };
        if caller != claim.claimant {
            return Err(EngineError::Unauthorized {
                actor: caller.to_string(),
                action: format!("answer the challenge on claim {}", claim_id),
            });
        }

        if now > deadline {
            warn!(claim_id = %claim_id, %deadline, "Proof arrived after resolution deadline");
            return self.finalize(&mut claim, ClaimResolution::DeadlineExpired, now);
        }

        let root = decode_root(&claim.merkle_root).ok_or_else(|| {
            EngineError::InvalidClaimParameters("stored merkle_root is malformed".to_string())
        })?;
        let input = public_input_hash(&root, claim.min_balance, &claim.sample_blocks);
        let valid = self.verifier.verify(proof, &input);

        if let Some(challenge) = claim.challenge.as_mut() {
            challenge.dispute_proof = Some(hex::encode(proof));
        }

        let resolution = if valid {
            ClaimResolution::ProofUpheld
        } else {
            ClaimResolution::ProofRejected
        };
        self.finalize(&mut claim, resolution, now)
    }

    /// Reject a challenged claim whose resolution deadline passed without a proof
    pub fn expire_challenge(&self, claim_id: &str, now: DateTime<Utc>) -> EngineResult<ClaimOutcome> {
        let mut claim = self
            .claims
            .get_mut(claim_id)
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))?;

        let deadline = match (&claim.status, &claim.challenge) {
            (ClaimStatus::Finalized(_), _) => {
                return Err(EngineError::ClaimAlreadyFinalized(claim_id.to_string()));
            }
            (ClaimStatus::Challenged, Some(challenge)) => challenge.resolution_deadline,
            _ => return Err(EngineError::ClaimNotChallenged(claim_id.to_string())),
        };
        if now <= deadline {
            return Err(EngineError::ResolutionWindowOpen { until: deadline });
        }

        self.finalize(&mut claim, ClaimResolution::DeadlineExpired, now)
    }

    /// Compare a claim against indexed balances
    pub fn audit_claim(&self, claim_id: &str, indexer: &dyn BalanceIndexer) -> anyhow::Result<ClaimAudit> {
        let claim = self
            .get(claim_id)
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))?;
        let report = evidence::audit(&claim, indexer)?;

        debug!(
            claim_id = %claim_id,
            commitment_matches = report.commitment_matches,
            shortfalls = report.shortfall_blocks.len(),
            "Audited claim"
        );
        Ok(report)
    }

    /// Pay out escrow and seal the claim. Ledger first, so a failed batch leaves the claim untouched.
    fn finalize(
        &self,
        claim: &mut Claim,
        resolution: ClaimResolution,
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimOutcome> {
        let batch = self.settlement(claim, resolution);
        self.ledger.commit(&batch, now)?;

        claim.status = ClaimStatus::Finalized(resolution);
        claim.finalized_at = Some(now);

        let accepted = resolution.is_accepted();
        info!(
            claim_id = %claim.id,
            claimant = %claim.claimant,
            resolution = ?resolution,
            "Claim finalized"
        );
        self.audit.record(
            AuditEventType::ClaimFinalized {
                claim_id: claim.id.clone(),
                claimant: claim.claimant.clone(),
                upheld: accepted,
            },
            if accepted {
                AuditSeverity::Info
            } else {
                AuditSeverity::Warning
            },
            now,
        );

        Ok(ClaimOutcome {
            claim: claim.clone(),
            accepted,
        })
    }

    fn settlement(&self, claim: &Claim, resolution: ClaimResolution) -> Vec<Transfer> {
        let escrow = AccountKey::claim_escrow(&claim.id);
        let claimant = AccountKey::wallet(&claim.claimant);
        let mut batch = Vec::new();
        let mut push = |to: AccountKey, amount: u128, kind: TransferType| {
            if amount > 0 {
                batch.push(Transfer::new(escrow.clone(), to, ASSET_ETH, amount, kind));
            }
        };

        let challenge = match (&claim.challenge, resolution) {
            (Some(challenge), ClaimResolution::ProofUpheld)
            | (Some(challenge), ClaimResolution::ProofRejected)
            | (Some(challenge), ClaimResolution::DeadlineExpired) => challenge,
            _ => {
                push(claimant, claim.stake, TransferType::StakeRefund);
                return batch;
            }
        };
        let challenger = AccountKey::wallet(&challenge.challenger);

        if resolution.is_accepted() {
            let reward = split_bps(challenge.stake, self.config.claimant_reward_bps);
            push(claimant.clone(), claim.stake, TransferType::StakeRefund);
            push(claimant, reward, TransferType::DisputeReward);
            push(
                AccountKey::reward_pool(),
                challenge.stake - reward,
                TransferType::StakeForfeit,
            );
        } else {
            let reward = split_bps(claim.stake, self.config.challenger_reward_bps);
            push(challenger.clone(), challenge.stake, TransferType::StakeRefund);
            push(challenger, reward, TransferType::DisputeReward);
            push(
                AccountKey::reward_pool(),
                claim.stake - reward,
                TransferType::StakeForfeit,
            );
        }

        batch
    }
}

fn split_bps(amount: u128, bps: u32) -> u128 {
    amount / 10_000 * bps as u128 + amount % 10_000 * bps as u128 / 10_000
}
