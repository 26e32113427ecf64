//! Integration tests for the credit engine
//!
//! These tests drive the [`EngineCoordinator`] end to end: optimistic claims
//! and disputes, reputation scoring and decay, borrowing, Dutch-auction
//! liquidation, the volume circuit breaker, and slash propagation between
//! two deployments over loopback and HTTP transports.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use silica_credit::claims::public_input_hash;
use silica_credit::config::{COLLATERAL_UNIT, USD, WEI_PER_ETH};
use silica_credit::crypto::{MessageSigner, SampleTree};
use silica_credit::ledger::{ASSET_ETH, ASSET_USD};
use silica_credit::{
    AccountKey, AttestedProofVerifier, BalanceSample, Claim, ClaimParams, ClaimResolution,
    ClaimStatus, Clock, Collaborators, CrossChainSlashMessage, CrossChainWiring, EngineConfig,
    EngineCoordinator, EngineError, ErrorKind, InMemoryIndexer, ManualClock, ReputationTier,
    SlashAction, SlashSeverity, StateSnapshot, StaticPriceOracle,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

const OPERATOR: &str = "ops@chert";
const WETH: &str = "WETH";
const START_BLOCK: u64 = 19_000_000;
const BLOCKS_PER_WEEK: u64 = 50_400;

/// Score of a 15 ETH, 52-week claimant with no other history
const HOLDER_SCORE: u32 = 472;
/// Same claimant plus a perfect remote score and full governance participation
const GOLD_SCORE: u32 = 722;

fn genesis() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

/// Key a remote "polygon" deployment signs its messages with
fn polygon_signer() -> MessageSigner {
    MessageSigner::from_seed([42u8; 32])
}

struct Deployment {
    engine: Arc<EngineCoordinator>,
    clock: Arc<ManualClock>,
    oracle: Arc<StaticPriceOracle>,
    indexer: Arc<InMemoryIndexer>,
    prover: SigningKey,
}

impl Deployment {
    fn advance(&self, by: Duration) -> DateTime<Utc> {
        self.clock.advance(by)
    }

    /// Publish a fresh WETH quote at the current time
    fn set_weth_price(&self, usd: u128) {
        self.oracle.set_price(WETH, usd * USD, self.clock.now());
    }
}

fn test_config(chain_id: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.security.operators = vec![OPERATOR.to_string()];
    config.crosschain.chain_id = chain_id.to_string();
    config.crosschain.max_retries = 2;
    config.crosschain.backoff_base_ms = 1;
    config.crosschain.backoff_max_ms = 4;
    config.crosschain.transport_timeout_ms = 2_000;
    config
}

/// Wiring with no replicas that trusts the polygon signer
fn local_wiring(seed: u8) -> CrossChainWiring {
    let mut trusted_sources = HashMap::new();
    trusted_sources.insert("polygon".to_string(), polygon_signer().verifying_key());
    CrossChainWiring {
        signer: MessageSigner::from_seed([seed; 32]),
        routes: Vec::new(),
        trusted_sources,
    }
}

fn deploy_at(config: &EngineConfig, wiring: CrossChainWiring, now: DateTime<Utc>) -> Deployment {
    let clock = Arc::new(ManualClock::new(now));
    let oracle = Arc::new(StaticPriceOracle::new());
    let indexer = Arc::new(InMemoryIndexer::new());
    let prover = SigningKey::from_bytes(&[17u8; 32]);

    let collaborators = Collaborators {
        clock: clock.clone(),
        verifier: Arc::new(AttestedProofVerifier::new(vec![prover.verifying_key()])),
        oracle: oracle.clone(),
        indexer: indexer.clone(),
    };
    let engine = Arc::new(EngineCoordinator::new(config, collaborators, wiring));

    engine
        .fund_pool("lp", ASSET_USD, 1_000_000 * USD)
        .expect("pool funding");

    Deployment {
        engine,
        clock,
        oracle,
        indexer,
        prover,
    }
}

fn deploy() -> Deployment {
    deploy_at(&test_config("ethereum"), local_wiring(1), genesis())
}

/// 52 weekly samples at a constant balance
fn weekly_samples(balance: u128) -> Vec<BalanceSample> {
    (0..52)
        .map(|week| BalanceSample {
            block: START_BLOCK + week * BLOCKS_PER_WEEK,
            balance,
        })
        .collect()
}

/// Claim parameters committing to `samples`
fn claim_params(claimant: &str, min_balance: u128, samples: &[BalanceSample]) -> ClaimParams {
    let root = SampleTree::build(samples).expect("sample tree").root();
    ClaimParams {
        claimant: claimant.to_string(),
        min_balance,
        start_block: samples[0].block,
        end_block: samples[samples.len() - 1].block,
        sample_blocks: samples.iter().map(|s| s.block).collect(),
        merkle_root: hex::encode(root),
        stake: WEI_PER_ETH / 10,
    }
}

fn honest_claim(claimant: &str) -> ClaimParams {
    claim_params(claimant, 15 * WEI_PER_ETH, &weekly_samples(15 * WEI_PER_ETH))
}

/// Attested proof over a claim's public inputs
fn prove(d: &Deployment, claim: &Claim) -> Vec<u8> {
    let root: [u8; 32] = hex::decode(&claim.merkle_root).unwrap().try_into().unwrap();
    let input = public_input_hash(&root, claim.min_balance, &claim.sample_blocks);
    d.prover.sign(&input).to_bytes().to_vec()
}

/// Submit an honest claim and let the optimism window run out
async fn accepted_holder(d: &Deployment, subject: &str) -> Claim {
    let claim = d.engine.submit_claim(honest_claim(subject)).unwrap();
    d.advance(Duration::days(7));
    let finalization = d.engine.auto_accept(&claim.id).await.unwrap();
    assert_eq!(finalization.score.as_ref().unwrap().score, HOLDER_SCORE);
    finalization.outcome.claim
}

/// Holder plus a mirrored polygon score of 1000 and full governance participation
async fn gold_borrower(d: &Deployment, subject: &str) {
    accepted_holder(d, subject).await;

    let sync = CrossChainSlashMessage::new(
        subject,
        SlashAction::ScoreSync { score: 1_000 },
        0,
        "polygon",
        1,
        d.clock.now(),
    )
    .signed(&polygon_signer());
    d.engine.receive_remote(&sync).unwrap();

    let update = d.engine.record_governance_activity(subject, 10, 10, 4).unwrap();
    assert_eq!(update.score, GOLD_SCORE);
    assert_eq!(update.tier, ReputationTier::Gold);
}

fn eth_balance(d: &Deployment, account: AccountKey) -> i128 {
    d.engine.ledger().balance(&account, ASSET_ETH)
}

fn usd_balance(d: &Deployment, account: AccountKey) -> i128 {
    d.engine.ledger().balance(&account, ASSET_USD)
}

// ============================================================================
// Claim Lifecycle Tests
// ============================================================================

mod claim_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_unchallenged_claim_auto_accepts() {
        let d = deploy();
        let claim = d.engine.submit_claim(honest_claim("0xalice")).unwrap();
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.challenge_deadline, genesis() + Duration::days(7));
        assert_eq!(
            eth_balance(&d, AccountKey::claim_escrow(&claim.id)),
            (WEI_PER_ETH / 10) as i128
        );

        // Still inside the optimism window
        d.advance(Duration::days(7) - Duration::seconds(1));
        let early = d.engine.auto_accept(&claim.id).await.unwrap_err();
        assert!(matches!(early.error, EngineError::OptimismWindowOpen { .. }));
        assert!(matches!(early.snapshot, StateSnapshot::Claim(ref c) if c.status == ClaimStatus::Submitted));

        d.advance(Duration::seconds(1));
        let finalization = d.engine.auto_accept(&claim.id).await.unwrap();
        let accepted = &finalization.outcome.claim;
        assert!(finalization.outcome.accepted);
        assert_eq!(accepted.resolution(), Some(ClaimResolution::AutoAccepted));
        assert_eq!(accepted.finalized_at, Some(d.clock.now()));

        let update = finalization.score.unwrap();
        assert_eq!(update.previous, 0);
        assert_eq!(update.score, HOLDER_SCORE);
        assert_eq!(update.tier, ReputationTier::Bronze);

        // Stake returned in full
        assert_eq!(eth_balance(&d, AccountKey::claim_escrow(&claim.id)), 0);
        assert_eq!(eth_balance(&d, AccountKey::wallet("0xalice")), 0);
    }

    #[tokio::test]
    async fn test_finalized_at_is_set_once() {
        let d = deploy();
        let claim = accepted_holder(&d, "0xalice").await;
        let finalized_at = claim.finalized_at;

        d.advance(Duration::days(1));
        let again = d.engine.auto_accept(&claim.id).await.unwrap_err();
        assert_eq!(again.error, EngineError::ClaimAlreadyFinalized(claim.id.clone()));
        match again.snapshot {
            StateSnapshot::Claim(snapshot) => {
                assert_eq!(snapshot.finalized_at, finalized_at);
                assert!(snapshot.status.is_final());
            }
            other => panic!("expected claim snapshot, got {:?}", other),
        }

        let challenge = d
            .engine
            .challenge_claim(&claim.id, "0xbob", WEI_PER_ETH / 5)
            .unwrap_err();
        assert_eq!(challenge.kind(), ErrorKind::StateConflict);
        assert_eq!(d.engine.get_claim(&claim.id).unwrap().finalized_at, finalized_at);
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let d = deploy();
        let claim = d.engine.submit_claim(honest_claim("0xalice")).unwrap();
        let mut ranks = vec![claim.status.rank()];

        let challenged = d
            .engine
            .challenge_claim(&claim.id, "0xbob", WEI_PER_ETH / 5)
            .unwrap();
        ranks.push(challenged.status.rank());

        // Rejected transitions leave the status where it was
        assert!(d.engine.auto_accept(&claim.id).await.is_err());
        ranks.push(d.engine.get_claim(&claim.id).unwrap().status.rank());
        assert!(d.engine.expire_challenge(&claim.id).await.is_err());
        ranks.push(d.engine.get_claim(&claim.id).unwrap().status.rank());

        d.advance(Duration::days(1));
        let proof = prove(&d, &challenged);
        d.engine
            .resolve_with_proof(&claim.id, "0xalice", &proof)
            .await
            .unwrap();
        ranks.push(d.engine.get_claim(&claim.id).unwrap().status.rank());

        assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", ranks);
        assert_eq!(ranks.last(), Some(&2));
    }

    #[tokio::test]
    async fn test_valid_proof_upholds_claim_and_pays_claimant() {
        let d = deploy();
        let claim = d.engine.submit_claim(honest_claim("0xalice")).unwrap();
        let challenged = d
            .engine
            .challenge_claim(&claim.id, "0xbob", WEI_PER_ETH / 5)
            .unwrap();

        let wrong_caller = d
            .engine
            .resolve_with_proof(&claim.id, "0xbob", &prove(&d, &challenged))
            .await
            .unwrap_err();
        assert!(matches!(wrong_caller.error, EngineError::Unauthorized { .. }));

        // The resolution deadline is inclusive
        d.advance(Duration::days(3));
        let finalization = d
            .engine
            .resolve_with_proof(&claim.id, "0xalice", &prove(&d, &challenged))
            .await
            .unwrap();
        assert_eq!(
            finalization.outcome.claim.resolution(),
            Some(ClaimResolution::ProofUpheld)
        );
        assert_eq!(finalization.score.unwrap().score, HOLDER_SCORE);

        // Claimant: stake back plus half the challenger's stake
        assert_eq!(eth_balance(&d, AccountKey::wallet("0xalice")), (WEI_PER_ETH / 10) as i128);
        assert_eq!(eth_balance(&d, AccountKey::wallet("0xbob")), -((WEI_PER_ETH / 5) as i128));
        assert_eq!(eth_balance(&d, AccountKey::reward_pool()), (WEI_PER_ETH / 10) as i128);
    }

    #[tokio::test]
    async fn test_invalid_proof_rejects_immediately() {
        let d = deploy();
        let claim = d.engine.submit_claim(honest_claim("0xalice")).unwrap();
        d.engine
            .challenge_claim(&claim.id, "0xbob", WEI_PER_ETH / 5)
            .unwrap();

        let finalization = d
            .engine
            .resolve_with_proof(&claim.id, "0xalice", &[0u8; 64])
            .await
            .unwrap();
        assert_eq!(
            finalization.outcome.claim.resolution(),
            Some(ClaimResolution::ProofRejected)
        );
        let slash = finalization.slash.unwrap();
        assert!(slash.blacklisted);
        assert!(finalization.propagation.is_none());
    }

    #[tokio::test]
    async fn test_submit_validation_rejects_bad_samples() {
        let d = deploy();

        let mut low_stake = honest_claim("0xalice");
        low_stake.stake = WEI_PER_ETH / 20;
        let err = d.engine.submit_claim(low_stake).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut tight = honest_claim("0xalice");
        tight.sample_blocks[1] = tight.sample_blocks[0] + 99;
        assert!(matches!(
            d.engine.submit_claim(tight).unwrap_err().error,
            EngineError::InvalidClaimParameters(_)
        ));

        let mut bad_root = honest_claim("0xalice");
        bad_root.merkle_root = "not-hex".to_string();
        assert!(d.engine.submit_claim(bad_root).is_err());

        assert!(d.engine.claims_by("0xalice").is_empty());
    }

    #[tokio::test]
    async fn test_paused_intake_blocks_submission() {
        let d = deploy();
        assert!(d.engine.pause_claims("mallory").is_err());
        d.engine.pause_claims(OPERATOR).unwrap();

        let err = d.engine.submit_claim(honest_claim("0xalice")).unwrap_err();
        assert!(matches!(err.error, EngineError::ComponentPaused(_)));

        d.engine.resume_claims(OPERATOR).unwrap();
        assert!(d.engine.submit_claim(honest_claim("0xalice")).is_ok());
    }
}

// ============================================================================
// Fraud Dispute Tests
// ============================================================================

mod fraud_dispute {
    use super::*;

    /// A claim of 15 ETH over a year by an address that held 2 ETH
    fn inflated_claim(d: &Deployment, claimant: &str) -> ClaimParams {
        for sample in weekly_samples(2 * WEI_PER_ETH) {
            d.indexer.record_balance(claimant, sample.block, sample.balance);
        }
        honest_claim(claimant)
    }

    #[tokio::test]
    async fn test_watcher_flags_inflated_claim() {
        let d = deploy();
        let claim = d.engine.submit_claim(inflated_claim(&d, "0xmallory")).unwrap();

        let audit = d.engine.audit_claim(&claim.id).unwrap();
        assert!(!audit.commitment_matches);
        assert!(!audit.all_samples_meet_minimum);
        assert_eq!(audit.shortfall_blocks.len(), 52);
        assert!(audit.recommend_challenge());
    }

    #[tokio::test]
    async fn test_unanswered_challenge_blacklists_claimant() {
        let d = deploy();
        let claim = d.engine.submit_claim(inflated_claim(&d, "0xmallory")).unwrap();

        d.advance(Duration::days(2));
        let wrong_stake = d
            .engine
            .challenge_claim(&claim.id, "0xwatcher", WEI_PER_ETH / 10)
            .unwrap_err();
        assert!(matches!(wrong_stake.error, EngineError::InvalidChallengerStake { .. }));

        let challenged = d
            .engine
            .challenge_claim(&claim.id, "0xwatcher", WEI_PER_ETH / 5)
            .unwrap();
        let deadline = challenged.challenge.as_ref().unwrap().resolution_deadline;
        assert_eq!(deadline, d.clock.now() + Duration::days(3));

        // Not yet: the deadline itself is still open
        d.clock.set(deadline);
        let early = d.engine.expire_challenge(&claim.id).await.unwrap_err();
        assert!(matches!(early.error, EngineError::ResolutionWindowOpen { .. }));

        d.advance(Duration::seconds(1));
        let finalization = d.engine.expire_challenge(&claim.id).await.unwrap();
        assert!(!finalization.outcome.accepted);
        assert_eq!(
            finalization.outcome.claim.resolution(),
            Some(ClaimResolution::DeadlineExpired)
        );

        let slash = finalization.slash.unwrap();
        assert_eq!(slash.severity_bps, 10_000);
        assert!(slash.blacklisted);

        let record = d.engine.reputation("0xmallory").unwrap();
        assert!(record.is_blacklisted);
        assert_eq!(record.score, 0);

        // Claimant stake forfeited: half to the challenger, half to the reward pool
        let stake = (WEI_PER_ETH / 10) as i128;
        assert_eq!(eth_balance(&d, AccountKey::wallet("0xmallory")), -stake);
        assert_eq!(eth_balance(&d, AccountKey::wallet("0xwatcher")), stake / 2);
        assert_eq!(eth_balance(&d, AccountKey::reward_pool()), stake / 2);
        assert_eq!(eth_balance(&d, AccountKey::claim_escrow(&claim.id)), 0);

        // A late proof changes nothing
        let late = d
            .engine
            .resolve_with_proof(&claim.id, "0xmallory", &prove(&d, &challenged))
            .await
            .unwrap_err();
        assert_eq!(late.error, EngineError::ClaimAlreadyFinalized(claim.id.clone()));
    }

    #[tokio::test]
    async fn test_blacklisted_claimant_cannot_borrow() {
        let d = deploy();
        let claim = d.engine.submit_claim(inflated_claim(&d, "0xmallory")).unwrap();
        d.engine
            .challenge_claim(&claim.id, "0xwatcher", WEI_PER_ETH / 5)
            .unwrap();
        d.advance(Duration::days(4));
        d.engine.expire_challenge(&claim.id).await.unwrap();

        d.set_weth_price(2_000);
        let err = d
            .engine
            .borrow("0xmallory", WETH, COLLATERAL_UNIT, 100 * USD)
            .unwrap_err();
        assert_eq!(err.error, EngineError::BorrowerBlacklisted("0xmallory".to_string()));
        match err.snapshot {
            StateSnapshot::Reputation(record) => assert!(record.is_blacklisted),
            other => panic!("expected reputation snapshot, got {:?}", other),
        }

        // Later good behaviour cannot lift a blacklist
        let update = d.engine.record_governance_activity("0xmallory", 5, 5, 2).unwrap();
        assert_eq!(update.score, 0);
    }
}

// ============================================================================
// Reputation Tests
// ============================================================================

mod reputation {
    use super::*;
    use silica_credit::reputation::{
        GovernanceActivity, HoldingsEvidence, LoanHistory, MAX_SCORE, ScoreWeights, ScoringEvidence,
    };
    use silica_credit::ScoringEngine;

    #[tokio::test]
    async fn test_holdings_share_halves_each_decay_period() {
        let d = deploy();
        accepted_holder(&d, "0xalice").await;
        let record = d.engine.reputation("0xalice").unwrap();
        assert_eq!(record.holdings_points, 197);

        d.advance(Duration::days(730));
        let decayed = d.engine.reputation("0xalice").unwrap();
        assert_eq!(decayed.holdings_points, 98);
        assert_eq!(decayed.score, HOLDER_SCORE - 99);
        assert_eq!(decayed.tier, ReputationTier::Bronze);
    }

    #[tokio::test]
    async fn test_recompute_never_lowers_score() {
        let d = deploy();
        gold_borrower(&d, "0xalice").await;

        // Nothing new: the stored score stands
        d.advance(Duration::days(30));
        let update = d.engine.recompute("0xalice");
        assert_eq!(update.previous, GOLD_SCORE);
        assert_eq!(update.score, GOLD_SCORE);
    }

    #[tokio::test]
    async fn test_scores_stay_within_bounds() {
        let d = deploy();
        accepted_holder(&d, "0xalice").await;

        for nonce in 1..=3 {
            let sync = CrossChainSlashMessage::new(
                "0xalice",
                SlashAction::ScoreSync { score: u32::MAX },
                0,
                "polygon",
                nonce,
                d.clock.now(),
            )
            .signed(&polygon_signer());
            d.engine.receive_remote(&sync).unwrap();
        }
        let update = d
            .engine
            .record_governance_activity("0xalice", 1_000, 1_000, 1_000)
            .unwrap();
        assert!(update.score <= MAX_SCORE);
        assert!(update.breakdown.cross_chain_reputation <= MAX_SCORE);
        assert!(update.breakdown.governance_participation <= MAX_SCORE);

        let err = d
            .engine
            .record_governance_activity("0xalice", 11, 10, 0)
            .unwrap_err();
        assert!(matches!(err.error, EngineError::InvalidGovernanceActivity(_)));
    }

    #[test]
    fn test_compute_score_is_deterministic() {
        let as_of = genesis();
        let evidence = ScoringEvidence {
            holdings: vec![
                HoldingsEvidence {
                    claim_id: "claim_1".to_string(),
                    min_balance: 15 * WEI_PER_ETH,
                    start_block: START_BLOCK,
                    end_block: START_BLOCK + 51 * BLOCKS_PER_WEEK,
                    accepted_at: as_of - Duration::days(800),
                },
                HoldingsEvidence {
                    claim_id: "claim_2".to_string(),
                    min_balance: 3 * WEI_PER_ETH,
                    start_block: START_BLOCK,
                    end_block: START_BLOCK + 10 * BLOCKS_PER_WEEK,
                    accepted_at: as_of - Duration::days(3),
                },
            ],
            loans: LoanHistory {
                loans_opened: 4,
                loans_repaid: 3,
                loans_liquidated: 1,
                total_borrowed: 40_000 * USD,
                total_repaid: 39_000 * USD,
                cumulative_ltv_bps: 24_000,
            },
            remote_scores: vec![640, 910],
            governance: GovernanceActivity {
                votes_cast: 7,
                eligible_votes: 20,
                proposals: 1,
            },
            as_of,
        };

        let first = ScoringEngine::new(ScoreWeights::default(), 730 * 86_400, 2_628_000);
        let second = ScoringEngine::new(ScoreWeights::default(), 730 * 86_400, 2_628_000);
        let a = first.compute_score("0xalice", &evidence);
        let b = second.compute_score("0xalice", &evidence);
        assert_eq!(a, b);
        assert_eq!(a, first.compute_score("0xalice", &evidence));

        let mut reordered = evidence.clone();
        reordered.holdings.reverse();
        reordered.remote_scores.reverse();
        assert_eq!(first.compute_score("0xalice", &reordered), a);
    }
}

// ============================================================================
// Credit and Liquidation Tests
// ============================================================================

mod credit {
    use super::*;
    use silica_credit::{AuctionCurve, LoanStatus};

    #[tokio::test]
    async fn test_ltv_capped_by_tier() {
        let d = deploy();
        gold_borrower(&d, "0xalice").await;
        d.set_weth_price(2_000);

        let over = d
            .engine
            .borrow("0xalice", WETH, 10 * COLLATERAL_UNIT, 15_001 * USD)
            .unwrap_err();
        assert!(matches!(
            over.error,
            EngineError::InsufficientReputation { max_ltv_bps: 7_500, .. }
        ));
        assert_eq!(over.kind(), ErrorKind::Economic);

        let loan = d
            .engine
            .borrow("0xalice", WETH, 10 * COLLATERAL_UNIT, 15_000 * USD)
            .unwrap();
        assert_eq!(loan.ltv_bps, 7_500);
        assert_eq!(loan.tier, ReputationTier::Gold);
        assert_eq!(loan.liquidation_threshold_bps, 8_300);
        assert_eq!(d.engine.loans_for("0xalice").len(), 1);
    }

    #[tokio::test]
    async fn test_stale_price_blocks_borrow_but_reports_unhealthy() {
        let d = deploy();
        d.set_weth_price(2_000);
        let loan = d
            .engine
            .borrow("0xbob", WETH, COLLATERAL_UNIT, 500 * USD)
            .unwrap();

        d.advance(Duration::hours(2));
        let err = d
            .engine
            .borrow("0xbob", WETH, COLLATERAL_UNIT, 500 * USD)
            .unwrap_err();
        assert!(matches!(err.error, EngineError::StalePrice { .. }));
        assert_eq!(err.kind(), ErrorKind::Oracle);

        let health = d.engine.loan_health(&loan.id).unwrap();
        assert!(!health.price_fresh);
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn test_full_repayment_raises_score() {
        let d = deploy();
        accepted_holder(&d, "0xalice").await;
        d.set_weth_price(2_000);

        let loan = d
            .engine
            .borrow("0xalice", WETH, COLLATERAL_UNIT, 1_000 * USD)
            .unwrap();
        assert_eq!(loan.ltv_bps, 5_000);

        d.advance(Duration::days(30));
        let outcome = d.engine.repay(&loan.id, 2_000 * USD).unwrap();
        assert!(outcome.closed);
        assert!(outcome.interest_paid > 0);
        assert_eq!(outcome.principal_paid, 1_000 * USD);
        assert_eq!(outcome.loan.status, LoanStatus::Repaid);

        let record = d.engine.reputation("0xalice").unwrap();
        assert_eq!(record.score, 647);
        assert_eq!(record.tier, ReputationTier::Silver);

        let again = d.engine.repay(&loan.id, USD).unwrap_err();
        assert!(matches!(again.error, EngineError::LoanNotActive { .. }));
    }

    #[tokio::test]
    async fn test_gold_borrower_liquidated_below_one() {
        let d = deploy();
        gold_borrower(&d, "0xalice").await;
        d.engine
            .fund_bad_debt_reserve("treasury", ASSET_USD, 10_000 * USD)
            .unwrap();
        d.set_weth_price(2_000);

        let loan = d
            .engine
            .borrow("0xalice", WETH, 10 * COLLATERAL_UNIT, 15_000 * USD)
            .unwrap();

        let healthy = d.engine.start_liquidation(&loan.id).unwrap_err();
        assert!(matches!(healthy.error, EngineError::PositionHealthy { .. }));

        // WETH slides to 1717: health factor ~0.95
        d.advance(Duration::hours(1));
        d.set_weth_price(1_717);
        let health = d.engine.poke_health(&loan.id).unwrap();
        let hf = health.health_factor_bps.unwrap();
        assert!((9_490..=9_510).contains(&hf), "health factor {}", hf);
        assert!(!health.healthy);
        assert_eq!(health.unhealthy_since, Some(d.clock.now()));

        // Gold grace period is 24 hours
        let grace = d.engine.start_liquidation(&loan.id).unwrap_err();
        assert!(matches!(grace.error, EngineError::GracePeriodActive { .. }));
        assert!(matches!(grace.snapshot, StateSnapshot::Loan(ref l) if l.status == LoanStatus::Active));

        d.advance(Duration::hours(24));
        d.set_weth_price(1_717);
        let auction = d.engine.start_liquidation(&loan.id).unwrap();
        assert_eq!(auction.start_price, 18_028_500_000);
        assert_eq!(auction.floor_price, 13_736_000_000);
        assert_eq!(d.engine.get_loan(&loan.id).unwrap().status, LoanStatus::Liquidating);

        let in_progress = d.engine.repay(&loan.id, USD).unwrap_err();
        assert!(matches!(in_progress.error, EngineError::LiquidationInProgress(_)));

        d.advance(Duration::hours(5));
        let settlement = d.engine.fill_auction(&auction.id, "0xkeeper").await.unwrap();
        let fill = &settlement.fill;
        assert!(fill.price < auction.start_price && fill.price > auction.floor_price);
        assert_eq!(fill.price, auction.quote(d.clock.now()));
        assert!(fill.shortfall > 0);
        assert_eq!(fill.debt_repaid, fill.price);
        assert_eq!(fill.surplus, 0);
        assert_eq!(fill.loan.status, LoanStatus::Liquidated);

        // ~3.7% shortfall is a minor default: 20% slash and six months' probation
        let default = &fill.default;
        assert!(default.shortfall_ratio_bps > 0 && default.shortfall_ratio_bps < 1_000);
        assert_eq!(default.severity, SlashSeverity::Minor);
        assert_eq!(settlement.slash.score_before, GOLD_SCORE);
        assert_eq!(settlement.slash.score_after, GOLD_SCORE - 144);
        assert_eq!(
            settlement.slash.probation_until,
            Some(d.clock.now() + Duration::days(182))
        );

        // Pool is made whole from the bid and the reserve
        assert_eq!(
            usd_balance(&d, AccountKey::lending_pool()),
            (1_000_000 * USD - 15_000 * USD + default.debt) as i128
        );
        assert_eq!(
            usd_balance(&d, AccountKey::bad_debt_reserve()),
            (10_000 * USD) as i128 - fill.shortfall as i128
        );
        assert_eq!(
            d.engine
                .ledger()
                .balance(&AccountKey::wallet("0xkeeper"), WETH),
            (10 * COLLATERAL_UNIT) as i128
        );

        let second = d.engine.fill_auction(&auction.id, "0xother").await.unwrap_err();
        assert!(matches!(second.error, EngineError::AuctionAlreadySettled(_)));
        assert!(matches!(second.snapshot, StateSnapshot::Auction(_)));

        d.set_weth_price(2_000);
        let probation = d
            .engine
            .borrow("0xalice", WETH, COLLATERAL_UNIT, 100 * USD)
            .unwrap_err();
        assert!(matches!(probation.error, EngineError::BorrowerOnProbation { .. }));
    }

    #[tokio::test]
    async fn test_auction_price_monotone_within_bounds() {
        for curve in [
            AuctionCurve::Linear,
            AuctionCurve::Exponential { half_life_secs: 3_600 },
        ] {
            let mut config = test_config("ethereum");
            config.credit.auction_curve = curve;
            let d = deploy_at(&config, local_wiring(1), genesis());

            d.set_weth_price(2_000);
            let loan = d
                .engine
                .borrow("0xbob", WETH, COLLATERAL_UNIT, 1_000 * USD)
                .unwrap();
            d.set_weth_price(1_000);
            let auction = d.engine.start_liquidation(&loan.id).unwrap();

            let mut last = auction.start_price;
            for minute in 0..=(7 * 60) {
                let price = auction.quote(auction.start_time + Duration::minutes(minute));
                assert!(price <= last, "{:?} rose at minute {}", curve, minute);
                assert!(price >= auction.floor_price && price <= auction.start_price);
                last = price;
            }
            assert_eq!(last, auction.floor_price);
        }
    }
}

// ============================================================================
// Circuit Breaker Tests
// ============================================================================

mod circuit_breaker {
    use super::*;

    fn capped() -> Deployment {
        let mut config = test_config("ethereum");
        config.risk.max_hourly_volume = 100_000 * USD;
        let d = deploy_at(&config, local_wiring(1), genesis());
        d.set_weth_price(2_000);
        d
    }

    #[tokio::test]
    async fn test_volume_cap_trips_and_requires_resume() {
        let d = capped();
        d.engine
            .borrow("0xa", WETH, 100 * COLLATERAL_UNIT, 60_000 * USD)
            .unwrap();
        d.engine
            .borrow("0xb", WETH, 100 * COLLATERAL_UNIT, 40_000 * USD)
            .unwrap();

        let state = d.engine.risk_state();
        assert_eq!(state.volume_in_window, 100_000 * USD);
        assert_eq!(state.remaining(), 0);

        let transfers = d.engine.ledger().transfer_count();
        let tripped = d
            .engine
            .borrow("0xc", WETH, COLLATERAL_UNIT, USD)
            .unwrap_err();
        assert_eq!(tripped.error, EngineError::CircuitBreakerTripped);
        assert_eq!(tripped.kind(), ErrorKind::SystemicRisk);
        match tripped.snapshot {
            StateSnapshot::Breaker(breaker) => {
                assert!(breaker.paused);
                assert_eq!(breaker.volume_in_window, 100_000 * USD);
            }
            other => panic!("expected breaker snapshot, got {:?}", other),
        }

        // No state change
        assert!(d.engine.loans_for("0xc").is_empty());
        assert_eq!(d.engine.ledger().transfer_count(), transfers);

        // A new window alone does not reopen intake
        d.advance(Duration::hours(2));
        d.set_weth_price(2_000);
        let still = d
            .engine
            .borrow("0xc", WETH, COLLATERAL_UNIT, USD)
            .unwrap_err();
        assert_eq!(still.error, EngineError::CircuitBreakerTripped);

        let denied = d.engine.resume_breaker("0xc").unwrap_err();
        assert!(matches!(denied.error, EngineError::Unauthorized { .. }));

        let resumed = d.engine.resume_breaker(OPERATOR).unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.volume_in_window, 0);

        d.engine
            .borrow("0xc", WETH, COLLATERAL_UNIT, USD)
            .unwrap();

        let not_tripped = d.engine.resume_breaker(OPERATOR).unwrap_err();
        assert_eq!(not_tripped.error, EngineError::BreakerNotTripped);
    }

    #[tokio::test]
    async fn test_repayment_allowed_while_paused() {
        let d = capped();
        let loan = d
            .engine
            .borrow("0xa", WETH, 100 * COLLATERAL_UNIT, 1_000 * USD)
            .unwrap();
        d.engine.pause_credit(OPERATOR).unwrap();

        assert!(d.engine.borrow("0xa", WETH, COLLATERAL_UNIT, USD).is_err());
        let outcome = d.engine.repay(&loan.id, 1_000 * USD).unwrap();
        assert!(outcome.closed);
    }
}

// ============================================================================
// Cross-Chain Propagation Tests
// ============================================================================

mod crosschain {
    use super::*;
    use silica_credit::api::{SecurityMiddlewareConfig, create_router};
    use silica_credit::{
        ApplyOutcome, AuditEventType, DeliveryMode, HttpSlashTransport, LoopbackTransport,
        ReplicaRoute, SlashTransport,
    };

    const SOURCE_SEED: u8 = 7;

    fn source_signer() -> MessageSigner {
        MessageSigner::from_seed([SOURCE_SEED; 32])
    }

    /// Arbitrum replica trusting the ethereum deployment's key
    fn replica() -> Deployment {
        let mut trusted_sources = HashMap::new();
        trusted_sources.insert("ethereum".to_string(), source_signer().verifying_key());
        let wiring = CrossChainWiring {
            signer: MessageSigner::from_seed([8u8; 32]),
            routes: Vec::new(),
            trusted_sources,
        };
        deploy_at(&test_config("arbitrum"), wiring, genesis())
    }

    /// Ethereum deployment delivering to `replica` over both transports
    fn source(
        replica: &Deployment,
        primary: Arc<dyn SlashTransport>,
        secondary: Arc<dyn SlashTransport>,
        mode: DeliveryMode,
    ) -> Deployment {
        let mut config = test_config("ethereum");
        config.crosschain.delivery_mode = mode;
        let wiring = CrossChainWiring {
            signer: source_signer(),
            routes: vec![ReplicaRoute {
                chain_id: replica.engine.chain_id().to_string(),
                primary,
                secondary,
            }],
            trusted_sources: HashMap::new(),
        };
        deploy_at(&config, wiring, genesis())
    }

    fn loopback(name: &str, replica: &Deployment) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport::new(
            name,
            replica.engine.receiver().clone(),
            replica.clock.clone(),
        ))
    }

    fn remote_applications(d: &Deployment) -> usize {
        d.engine
            .audit()
            .get_recent(1_000)
            .iter()
            .filter(|e| matches!(e.event_type, AuditEventType::RemoteSlashApplied { .. }))
            .count()
    }

    async fn serve(replica: &Deployment) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(
            replica.engine.clone(),
            SecurityMiddlewareConfig {
                api_keys: vec!["replica-key".to_string()],
                log_requests: false,
                ..SecurityMiddlewareConfig::default()
            },
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fraud_blacklist_reaches_replica() {
        let remote = replica();
        let primary = loopback("relay-a", &remote);
        let secondary = loopback("relay-b", &remote);
        let d = source(&remote, primary.clone(), secondary.clone(), DeliveryMode::Failover);

        // The replica already knows the subject
        accepted_holder(&remote, "0xmallory").await;

        let claim = d.engine.submit_claim(honest_claim("0xmallory")).unwrap();
        d.engine
            .challenge_claim(&claim.id, "0xwatcher", WEI_PER_ETH / 5)
            .unwrap();
        d.advance(Duration::days(3) + Duration::seconds(1));

        primary.set_offline(true);
        let finalization = d.engine.expire_challenge(&claim.id).await.unwrap();
        let report = finalization.propagation.unwrap();
        assert!(report.fully_delivered());
        assert_eq!(report.delivered[0].transport, "relay-b");
        assert_eq!(report.message.action, SlashAction::Blacklist);

        let mirrored = remote.engine.reputation("0xmallory").unwrap();
        assert!(mirrored.is_blacklisted);
        assert_eq!(mirrored.score, 0);
        assert_eq!(remote.engine.receiver().applied_count(), 1);
    }

    #[tokio::test]
    async fn test_redundant_loopback_applies_once() {
        let remote = replica();
        accepted_holder(&remote, "0xalice").await;
        let d = source(
            &remote,
            loopback("relay-a", &remote),
            loopback("relay-b", &remote),
            DeliveryMode::Redundant,
        );

        d.engine.blacklist(OPERATOR, "0xalice").await.unwrap();

        assert_eq!(remote.engine.receiver().applied_count(), 1);
        assert_eq!(remote_applications(&remote), 1);
        assert!(remote.engine.reputation("0xalice").unwrap().is_blacklisted);
    }

    #[tokio::test]
    async fn test_redundant_http_and_loopback_apply_once() {
        let remote = replica();
        accepted_holder(&remote, "0xalice").await;
        let base_url = serve(&remote).await;

        let http = Arc::new(
            HttpSlashTransport::new("https-relay", &base_url, std::time::Duration::from_secs(5))
                .unwrap(),
        );
        let d = source(
            &remote,
            http,
            loopback("relay-b", &remote),
            DeliveryMode::Redundant,
        );

        let result = d.engine.blacklist(OPERATOR, "0xalice").await.unwrap();
        let report = result.propagation.unwrap();
        assert!(report.fully_delivered(), "{:?}", report.failed);

        assert_eq!(remote.engine.receiver().applied_count(), 1);
        assert_eq!(remote_applications(&remote), 1);

        // Replaying the signed message over HTTP is absorbed as a duplicate
        let replayed = HttpSlashTransport::new("replay", &base_url, std::time::Duration::from_secs(5))
            .unwrap()
            .send("arbitrum", &report.message)
            .await;
        assert!(replayed.is_ok());
        assert_eq!(remote_applications(&remote), 1);
    }

    #[tokio::test]
    async fn test_replayed_message_is_idempotent() {
        let remote = replica();
        accepted_holder(&remote, "0xalice").await;

        let message = CrossChainSlashMessage::new(
            "0xalice",
            SlashAction::Slash,
            5_000,
            "ethereum",
            99,
            remote.clock.now(),
        )
        .signed(&source_signer());

        let first = remote.engine.receive_remote(&message).unwrap();
        assert_eq!(
            first,
            ApplyOutcome::Applied {
                subject: "0xalice".to_string(),
                score: HOLDER_SCORE - HOLDER_SCORE / 2,
            }
        );
        let after_first = remote.engine.reputation("0xalice").unwrap();

        for _ in 0..3 {
            assert_eq!(remote.engine.receive_remote(&message).unwrap(), ApplyOutcome::Duplicate);
        }
        assert_eq!(remote.engine.reputation("0xalice").unwrap(), after_first);

        let mut forged = message.clone();
        forged.severity_bps = 10_000;
        let rejected = remote.engine.receive_remote(&forged).unwrap_err();
        assert!(matches!(rejected.error, EngineError::InvalidMessage(_)));
        assert!(matches!(rejected.snapshot, StateSnapshot::Reputation(_)));
    }

    #[tokio::test]
    async fn test_exhausted_delivery_escalates_and_retries() {
        let remote = replica();
        let primary = loopback("relay-a", &remote);
        let secondary = loopback("relay-b", &remote);
        let d = source(&remote, primary.clone(), secondary.clone(), DeliveryMode::Failover);

        primary.set_offline(true);
        secondary.set_offline(true);
        let result = d.engine.blacklist(OPERATOR, "0xalice").await.unwrap();
        assert!(!result.propagation.unwrap().fully_delivered());
        assert_eq!(d.engine.failed_deliveries().len(), 1);

        // Local state is authoritative regardless of delivery
        assert!(d.engine.reputation("0xalice").unwrap().is_blacklisted);

        assert!(d.engine.retry_failed("0xalice").await.is_err());

        secondary.set_offline(false);
        let retried = d.engine.retry_failed(OPERATOR).await.unwrap();
        assert_eq!(retried.delivered.len(), 1);
        assert!(d.engine.failed_deliveries().is_empty());
        assert!(remote.engine.reputation("0xalice").unwrap().is_blacklisted);
    }
}
