//! Engine coordinator
//!
//! Wires the claim machine, reputation store, credit engine, circuit breaker
//! and cross-chain synchronizer into one facade. Every write path takes `now`
//! from the injected [`Clock`], runs the synchronous transition, and only then
//! touches the network. A failed operation comes back as a [`Rejection`]
//! carrying the authoritative snapshot of the entity it concerned.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::capability::{Action, Authorizable, OperatorRegistry, PauseSwitch};
use crate::claims::{
    BalanceSample, Claim, ClaimAudit, ClaimDisputeMachine, ClaimOutcome, ClaimParams,
};
use crate::config::EngineConfig;
use crate::credit::{
    CreditEngine, FillOutcome, HealthReport, LiquidationAuction, Loan, RepayOutcome,
};
use crate::crosschain::{
    ApplyOutcome, BroadcastReport, CrossChainSlashMessage, FailedDelivery, HttpSlashTransport,
    ReplicaReceiver, ReplicaRoute, RetryReport, SlashSynchronizer,
};
use crate::crypto::{MessageSigner, parse_public_key};
use crate::error::{EngineError, Rejection, StateSnapshot};
use crate::external::{
    BalanceIndexer, BalanceRecorder, Clock, PriceOracle, PricePublisher, PriceQuote, ProofVerifier,
};
use crate::ledger::{AccountKey, StakeLedger};
use crate::reputation::{
    GovernanceActivity, ReputationRecord, ReputationStore, ScoreUpdate, SlashEvent, SlashReason,
    SlashSeverity,
};
use crate::risk::{CircuitBreakerState, RiskController};

/// External capabilities the engine consumes
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub verifier: Arc<dyn ProofVerifier>,
    pub oracle: Arc<dyn PriceOracle>,
    pub indexer: Arc<dyn BalanceIndexer>,
}

/// Cross-chain wiring for one deployment
pub struct CrossChainWiring {
    pub signer: MessageSigner,
    pub routes: Vec<ReplicaRoute>,
    pub trusted_sources: HashMap<String, VerifyingKey>,
}

impl CrossChainWiring {
    /// Build HTTP routes and trusted keys from configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let crosschain = &config.crosschain;

        let signer = if crosschain.signing_seed_hex.is_empty() {
            MessageSigner::generate()
        } else {
            MessageSigner::from_seed_hex(&crosschain.signing_seed_hex)
                .context("Invalid cross-chain signing seed")?
        };

        let mut routes = Vec::with_capacity(crosschain.replicas.len());
        for replica in &crosschain.replicas {
            let primary = HttpSlashTransport::new(
                &format!("{}-primary", replica.chain_id),
                &replica.primary_url,
                crosschain.transport_timeout(),
            )?;
            let secondary = HttpSlashTransport::new(
                &format!("{}-secondary", replica.chain_id),
                &replica.secondary_url,
                crosschain.transport_timeout(),
            )?;
            routes.push(ReplicaRoute {
                chain_id: replica.chain_id.clone(),
                primary: Arc::new(primary),
                secondary: Arc::new(secondary),
            });
        }

        let mut trusted_sources = HashMap::new();
        for source in &crosschain.trusted_sources {
            let key = parse_public_key(&source.public_key_hex)
                .with_context(|| format!("Invalid public key for source chain {}", source.chain_id))?;
            trusted_sources.insert(source.chain_id.clone(), key);
        }

        Ok(Self {
            signer,
            routes,
            trusted_sources,
        })
    }
}

/// A finalized claim and what it did to the claimant's reputation
#[derive(Debug, Clone, Serialize)]
pub struct ClaimFinalization {
    pub outcome: ClaimOutcome,
    pub score: Option<ScoreUpdate>,
    pub slash: Option<SlashEvent>,
    pub propagation: Option<BroadcastReport>,
}

/// A filled auction and the borrower's resulting slash
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationSettlement {
    pub fill: FillOutcome,
    pub slash: SlashEvent,
    pub propagation: Option<BroadcastReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlacklistResult {
    pub slash: SlashEvent,
    pub propagation: Option<BroadcastReport>,
}

/// Writable ends of the price and balance ports, for deployments fed by operators
#[derive(Clone)]
pub struct OperatorFeeds {
    pub prices: Arc<dyn PricePublisher>,
    pub balances: Arc<dyn BalanceRecorder>,
}

pub struct EngineCoordinator {
    clock: Arc<dyn Clock>,
    indexer: Arc<dyn BalanceIndexer>,
    feeds: Option<OperatorFeeds>,
    ledger: Arc<StakeLedger>,
    audit: Arc<AuditLogger>,
    operators: Arc<OperatorRegistry>,
    claim_intake: Arc<PauseSwitch>,
    claims: ClaimDisputeMachine,
    reputation: Arc<ReputationStore>,
    credit: CreditEngine,
    risk: Arc<RiskController>,
    synchronizer: SlashSynchronizer,
    receiver: Arc<ReplicaReceiver>,
}

impl EngineCoordinator {
    pub fn new(config: &EngineConfig, collaborators: Collaborators, wiring: CrossChainWiring) -> Self {
        let now = collaborators.clock.now();
        let audit = Arc::new(AuditLogger::new());
        let ledger = Arc::new(StakeLedger::new());
        let operators = Arc::new(OperatorRegistry::new(config.security.operators.iter().cloned()));
        let claim_intake = Arc::new(PauseSwitch::new("claim intake"));
        let reputation = Arc::new(ReputationStore::new(&config.reputation));

        let risk = Arc::new(RiskController::new(
            config.risk.clone(),
            audit.clone(),
            operators.clone(),
            now,
        ));

        let claims = ClaimDisputeMachine::new(
            config.claims.clone(),
            ledger.clone(),
            collaborators.verifier.clone(),
            claim_intake.clone(),
            audit.clone(),
        );

        let credit = CreditEngine::new(
            config.credit.clone(),
            config.reputation.severity.clone(),
            reputation.clone(),
            collaborators.oracle.clone(),
            risk.clone(),
            ledger.clone(),
            audit.clone(),
        );

        let receiver = Arc::new(ReplicaReceiver::new(
            &config.crosschain.chain_id,
            reputation.clone(),
            wiring.trusted_sources,
            audit.clone(),
        ));

        let synchronizer = SlashSynchronizer::new(
            config.crosschain.clone(),
            wiring.signer,
            wiring.routes,
            operators.clone(),
            audit.clone(),
            now,
        );

        info!(
            chain_id = %config.crosschain.chain_id,
            replicas = synchronizer.destinations().len(),
            operators = config.security.operators.len(),
            "Engine coordinator initialized"
        );

        Self {
            clock: collaborators.clock,
            indexer: collaborators.indexer,
            feeds: None,
            ledger,
            audit,
            operators,
            claim_intake,
            claims,
            reputation,
            credit,
            risk,
            synchronizer,
            receiver,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn ledger(&self) -> &Arc<StakeLedger> {
        &self.ledger
    }

    pub fn reputation_store(&self) -> &Arc<ReputationStore> {
        &self.reputation
    }

    pub fn receiver(&self) -> &Arc<ReplicaReceiver> {
        &self.receiver
    }

    pub fn chain_id(&self) -> &str {
        self.synchronizer.chain_id()
    }

    pub fn public_key_hex(&self) -> String {
        self.synchronizer.public_key_hex()
    }

    /// Accept prices and balance history pushed through the operator API
    pub fn with_operator_feeds(mut self, feeds: OperatorFeeds) -> Self {
        self.feeds = Some(feeds);
        self
    }

    fn operator_feeds(&self) -> Result<&OperatorFeeds, Rejection> {
        Ok(self
            .feeds
            .as_ref()
            .ok_or(EngineError::FeedNotWired("operator"))?)
    }

    /// Seed lending pool liquidity
    pub fn fund_pool(&self, funder: &str, asset: &str, amount: u128) -> Result<(), Rejection> {
        self.ledger
            .fund(funder, AccountKey::lending_pool(), asset, amount, self.now())?;
        Ok(())
    }

    /// Seed the reserve that absorbs liquidation shortfalls
    pub fn fund_bad_debt_reserve(&self, funder: &str, asset: &str, amount: u128) -> Result<(), Rejection> {
        self.ledger
            .fund(funder, AccountKey::bad_debt_reserve(), asset, amount, self.now())?;
        Ok(())
    }

    fn claim_snapshot(&self, claim_id: &str) -> StateSnapshot {
        self.claims
            .get(claim_id)
            .map_or(StateSnapshot::None, StateSnapshot::Claim)
    }

    fn loan_snapshot(&self, loan_id: &str) -> StateSnapshot {
        self.credit
            .get_loan(loan_id)
            .map_or(StateSnapshot::None, StateSnapshot::Loan)
    }

    fn auction_snapshot(&self, auction_id: &str) -> StateSnapshot {
        self.credit
            .get_auction(auction_id)
            .map_or(StateSnapshot::None, StateSnapshot::Auction)
    }

    fn reputation_snapshot(&self, subject: &str, now: DateTime<Utc>) -> StateSnapshot {
        self.reputation
            .get(subject, now)
            .map_or(StateSnapshot::None, StateSnapshot::Reputation)
    }

    fn breaker_snapshot(&self, now: DateTime<Utc>) -> StateSnapshot {
        StateSnapshot::Breaker(self.risk.state(now))
    }

    fn authorize(&self, operator: &str, action: Action, now: DateTime<Utc>) -> Result<(), Rejection> {
        if let Err(e) = self.operators.authorize(operator, action) {
            self.audit.record(
                AuditEventType::UnauthorizedAttempt {
                    actor: operator.to_string(),
                    action: action.as_str().to_string(),
                },
                AuditSeverity::Warning,
                now,
            );
            return Err(e.into());
        }
        Ok(())
    }

    // --- Claims ---

    pub fn get_claim(&self, claim_id: &str) -> Option<Claim> {
        self.claims.get(claim_id)
    }

    pub fn claims_by(&self, claimant: &str) -> Vec<Claim> {
        self.claims.claims_by(claimant)
    }

    pub fn submit_claim(&self, params: ClaimParams) -> Result<Claim, Rejection> {
        Ok(self.claims.submit(params, self.now())?)
    }

    pub fn challenge_claim(&self, claim_id: &str, challenger: &str, stake: u128) -> Result<Claim, Rejection> {
        self.claims
            .challenge(claim_id, challenger, stake, self.now())
            .map_err(|e| Rejection::new(e, self.claim_snapshot(claim_id)))
    }

    pub async fn auto_accept(&self, claim_id: &str) -> Result<ClaimFinalization, Rejection> {
        let now = self.now();
        let outcome = self
            .claims
            .auto_accept(claim_id, now)
            .map_err(|e| Rejection::new(e, self.claim_snapshot(claim_id)))?;
        Ok(self.apply_claim_outcome(outcome, now).await)
    }

    pub async fn resolve_with_proof(
        &self,
        claim_id: &str,
        caller: &str,
        proof: &[u8],
    ) -> Result<ClaimFinalization, Rejection> {
        let now = self.now();
        let outcome = self
            .claims
            .resolve_with_proof(claim_id, caller, proof, now)
            .map_err(|e| Rejection::new(e, self.claim_snapshot(claim_id)))?;
        Ok(self.apply_claim_outcome(outcome, now).await)
    }

    /// Reject a challenged claim whose resolution deadline has passed
    pub async fn expire_challenge(&self, claim_id: &str) -> Result<ClaimFinalization, Rejection> {
        let now = self.now();
        let outcome = self
            .claims
            .expire_challenge(claim_id, now)
            .map_err(|e| Rejection::new(e, self.claim_snapshot(claim_id)))?;
        Ok(self.apply_claim_outcome(outcome, now).await)
    }

    pub fn audit_claim(&self, claim_id: &str) -> Result<ClaimAudit> {
        self.claims.audit_claim(claim_id, self.indexer.as_ref())
    }

    /// Accepted claims become holdings evidence; rejected ones are fraud
    async fn apply_claim_outcome(&self, outcome: ClaimOutcome, now: DateTime<Utc>) -> ClaimFinalization {
        let claimant = outcome.claim.claimant.clone();

        if let Some(evidence) = outcome.claim.holdings_evidence() {
            self.reputation.add_holdings(&claimant, evidence, now);
            let update = self.recompute_at(&claimant, now);
            return ClaimFinalization {
                outcome,
                score: Some(update),
                slash: None,
                propagation: None,
            };
        }

        let slash = self.reputation.slash(
            &claimant,
            SlashSeverity::Full,
            SlashReason::FraudulentClaim {
                claim_id: outcome.claim.id.clone(),
            },
            now,
        );
        let propagation = self.propagate(&slash, now).await;
        ClaimFinalization {
            outcome,
            score: None,
            slash: Some(slash),
            propagation,
        }
    }

    pub fn pause_claims(&self, operator: &str) -> Result<(), Rejection> {
        let now = self.now();
        self.authorize(operator, Action::PauseIntake, now)?;
        self.claim_intake.pause();
        warn!(operator = %operator, "Claim intake paused");
        self.audit.record(
            AuditEventType::IntakePaused {
                component: "claim intake".to_string(),
                operator: operator.to_string(),
            },
            AuditSeverity::Warning,
            now,
        );
        Ok(())
    }

    pub fn resume_claims(&self, operator: &str) -> Result<(), Rejection> {
        let now = self.now();
        self.authorize(operator, Action::ResumeIntake, now)?;
        self.claim_intake.resume();
        info!(operator = %operator, "Claim intake resumed");
        Ok(())
    }

    // --- Operator feeds ---

    /// Publish a price stamped with the engine clock
    pub fn publish_price(&self, operator: &str, asset: &str, price: u128) -> Result<PriceQuote, Rejection> {
        let now = self.now();
        self.authorize(operator, Action::PublishPrice, now)?;
        let feeds = self.operator_feeds()?;
        if asset.is_empty() {
            return Err(EngineError::InvalidFeedUpdate("asset is required".to_string()).into());
        }
        if price == 0 {
            return Err(EngineError::InvalidFeedUpdate(format!("zero price for {}", asset)).into());
        }

        feeds.prices.publish(asset, price, now);
        info!(operator = %operator, asset = %asset, price = %price, "Price published");
        self.audit.record(
            AuditEventType::FeedUpdated {
                operator: operator.to_string(),
                feed: "price".to_string(),
                key: asset.to_string(),
            },
            AuditSeverity::Info,
            now,
        );
        Ok(PriceQuote {
            price,
            timestamp: now,
        })
    }

    /// Load balance history for an address. Returns how many samples were recorded.
    pub fn index_balances(
        &self,
        operator: &str,
        address: &str,
        samples: &[BalanceSample],
    ) -> Result<usize, Rejection> {
        let now = self.now();
        self.authorize(operator, Action::IndexBalances, now)?;
        let feeds = self.operator_feeds()?;
        if address.is_empty() {
            return Err(EngineError::InvalidFeedUpdate("address is required".to_string()).into());
        }
        if samples.is_empty() {
            return Err(EngineError::InvalidFeedUpdate(format!("no samples for {}", address)).into());
        }

        for sample in samples {
            feeds.balances.record(address, sample.block, sample.balance);
        }
        info!(
            operator = %operator,
            address = %address,
            samples = samples.len(),
            "Balance history indexed"
        );
        self.audit.record(
            AuditEventType::FeedUpdated {
                operator: operator.to_string(),
                feed: "balances".to_string(),
                key: address.to_string(),
            },
            AuditSeverity::Info,
            now,
        );
        Ok(samples.len())
    }

    /// Operator-gated pool funding; the operator's wallet is the funder.
    /// Returns the pool balance afterwards.
    pub fn operator_fund_pool(&self, operator: &str, asset: &str, amount: u128) -> Result<i128, Rejection> {
        let now = self.now();
        self.authorize(operator, Action::FundPool, now)?;
        if amount == 0 {
            return Err(
                EngineError::InvalidFeedUpdate("funding amount must be positive".to_string()).into(),
            );
        }
        self.ledger
            .fund(operator, AccountKey::lending_pool(), asset, amount, now)?;
        let balance = self.ledger.balance(&AccountKey::lending_pool(), asset);
        info!(
            operator = %operator,
            asset = %asset,
            amount = %amount,
            balance = %balance,
            "Lending pool funded"
        );
        Ok(balance)
    }

    // --- Reputation ---

    pub fn reputation(&self, subject: &str) -> Option<ReputationRecord> {
        self.reputation.get(subject, self.now())
    }

    fn recompute_at(&self, subject: &str, now: DateTime<Utc>) -> ScoreUpdate {
        let history = self.credit.loan_history(subject);
        self.reputation.recompute(subject, &history, now)
    }

    pub fn recompute(&self, subject: &str) -> ScoreUpdate {
        self.recompute_at(subject, self.now())
    }

    pub fn record_governance_activity(
        &self,
        subject: &str,
        votes_cast: u32,
        eligible_votes: u32,
        proposals: u32,
    ) -> Result<ScoreUpdate, Rejection> {
        if votes_cast > eligible_votes {
            return Err(EngineError::InvalidGovernanceActivity(format!(
                "votes cast {} exceed eligible votes {}",
                votes_cast, eligible_votes
            ))
            .into());
        }
        let now = self.now();
        self.reputation.record_governance(
            subject,
            GovernanceActivity {
                votes_cast,
                eligible_votes,
                proposals,
            },
            now,
        );
        Ok(self.recompute_at(subject, now))
    }

    /// Operator blacklist, mirrored to every replica
    pub async fn blacklist(&self, operator: &str, subject: &str) -> Result<BlacklistResult, Rejection> {
        let now = self.now();
        self.authorize(operator, Action::Blacklist, now)?;

        let slash = self.reputation.blacklist(
            subject,
            SlashReason::Manual {
                operator: operator.to_string(),
            },
            now,
        );
        let propagation = self.propagate(&slash, now).await;
        Ok(BlacklistResult { slash, propagation })
    }

    // --- Credit ---

    pub fn get_loan(&self, loan_id: &str) -> Option<Loan> {
        self.credit.get_loan(loan_id)
    }

    pub fn get_auction(&self, auction_id: &str) -> Option<LiquidationAuction> {
        self.credit.get_auction(auction_id)
    }

    pub fn loans_for(&self, borrower: &str) -> Vec<Loan> {
        self.credit.loans_for(borrower)
    }

    pub fn borrow(
        &self,
        borrower: &str,
        collateral_asset: &str,
        collateral_amount: u128,
        principal: u128,
    ) -> Result<Loan, Rejection> {
        let now = self.now();
        self.credit
            .borrow(borrower, collateral_asset, collateral_amount, principal, now)
            .map_err(|e| {
                let snapshot = match &e {
                    EngineError::CircuitBreakerTripped => self.breaker_snapshot(now),
                    EngineError::InsufficientReputation { .. }
                    | EngineError::BorrowerOnProbation { .. }
                    | EngineError::BorrowerBlacklisted(_) => self.reputation_snapshot(borrower, now),
                    _ => StateSnapshot::None,
                };
                Rejection::new(e, snapshot)
            })
    }

    pub fn accrue_interest(&self, loan_id: &str) -> Result<Loan, Rejection> {
        self.credit
            .accrue_interest(loan_id, self.now())
            .map_err(|e| Rejection::new(e, self.loan_snapshot(loan_id)))
    }

    /// Repayment is open while paused and during probation
    pub fn repay(&self, loan_id: &str, amount: u128) -> Result<RepayOutcome, Rejection> {
        let now = self.now();
        let outcome = self
            .credit
            .repay(loan_id, amount, now)
            .map_err(|e| Rejection::new(e, self.loan_snapshot(loan_id)))?;

        if outcome.closed {
            self.recompute_at(&outcome.loan.borrower, now);
        }
        Ok(outcome)
    }

    pub fn loan_health(&self, loan_id: &str) -> Result<HealthReport, Rejection> {
        self.credit
            .compute_health_factor(loan_id, self.now())
            .map_err(|e| Rejection::new(e, self.loan_snapshot(loan_id)))
    }

    pub fn poke_health(&self, loan_id: &str) -> Result<HealthReport, Rejection> {
        self.credit
            .poke_health(loan_id, self.now())
            .map_err(|e| Rejection::new(e, self.loan_snapshot(loan_id)))
    }

    pub fn start_liquidation(&self, loan_id: &str) -> Result<LiquidationAuction, Rejection> {
        self.credit
            .start_liquidation(loan_id, self.now())
            .map_err(|e| Rejection::new(e, self.loan_snapshot(loan_id)))
    }

    /// First valid fill wins; the borrower is slashed by shortfall severity
    pub async fn fill_auction(
        &self,
        auction_id: &str,
        liquidator: &str,
    ) -> Result<LiquidationSettlement, Rejection> {
        let now = self.now();
        let fill = self
            .credit
            .fill(auction_id, liquidator, now)
            .map_err(|e| Rejection::new(e, self.auction_snapshot(auction_id)))?;

        let default = &fill.default;
        let slash = self.reputation.slash(
            &default.borrower,
            default.severity,
            SlashReason::LoanDefault {
                loan_id: default.loan_id.clone(),
                shortfall_ratio_bps: default.shortfall_ratio_bps,
            },
            now,
        );
        let propagation = self.propagate(&slash, now).await;

        Ok(LiquidationSettlement {
            fill,
            slash,
            propagation,
        })
    }

    // --- Risk ---

    pub fn risk_state(&self) -> CircuitBreakerState {
        self.risk.state(self.now())
    }

    pub fn resume_breaker(&self, operator: &str) -> Result<CircuitBreakerState, Rejection> {
        let now = self.now();
        self.risk
            .resume(operator, now)
            .map_err(|e| Rejection::new(e, self.breaker_snapshot(now)))
    }

    pub fn pause_credit(&self, operator: &str) -> Result<CircuitBreakerState, Rejection> {
        let now = self.now();
        self.risk
            .pause(operator, now)
            .map_err(|e| Rejection::new(e, self.breaker_snapshot(now)))
    }

    // --- Cross-chain ---

    /// Fan a local slash out to the replicas. No store lock is held here.
    async fn propagate(&self, slash: &SlashEvent, now: DateTime<Utc>) -> Option<BroadcastReport> {
        if matches!(slash.reason, SlashReason::Remote { .. }) {
            return None;
        }
        if self.synchronizer.destinations().is_empty() {
            return None;
        }

        let report = if slash.blacklisted {
            self.synchronizer.propagate_blacklist(&slash.subject, now).await
        } else {
            self.synchronizer
                .propagate_slash(&slash.subject, slash.severity_bps, now)
                .await
        };
        if !report.fully_delivered() {
            warn!(
                subject = %slash.subject,
                failed = report.failed.len(),
                "Slash propagation escalated to operators"
            );
        }
        Some(report)
    }

    /// Mirror a subject's current score to the replicas
    pub async fn sync_score(&self, subject: &str) -> Result<BroadcastReport, Rejection> {
        let now = self.now();
        let record = self
            .reputation
            .get(subject, now)
            .ok_or_else(|| EngineError::InvalidMessage(format!("no reputation for {}", subject)))?;
        self.synchronizer
            .sync_score(subject, record.score, now)
            .await
            .map_err(|e| Rejection::new(e, StateSnapshot::Reputation(record)))
    }

    pub fn receive_remote(&self, message: &CrossChainSlashMessage) -> Result<ApplyOutcome, Rejection> {
        let now = self.now();
        self.receiver
            .receive(message, now)
            .map_err(|e| Rejection::new(e, self.reputation_snapshot(&message.subject, now)))
    }

    pub fn failed_deliveries(&self) -> Vec<FailedDelivery> {
        self.synchronizer.failed_deliveries()
    }

    pub async fn retry_failed(&self, operator: &str) -> Result<RetryReport, Rejection> {
        Ok(self.synchronizer.retry_failed(operator, self.now()).await?)
    }
}
