//! Credit engine: borrow, accrue, repay, monitor, liquidate

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::auction::{AuctionStatus, LiquidationAuction};
use super::loan::{Loan, LoanStatus};
use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::capability::Pausable;
use crate::config::{COLLATERAL_UNIT, CreditConfig};
use crate::error::{EngineError, EngineResult};
use crate::external::PriceOracle;
use crate::ledger::{ASSET_USD, AccountKey, StakeLedger, Transfer, TransferType};
use crate::reputation::{LoanHistory, ReputationReader, SlashSeverity, SlashSeverityTable};
use crate::risk::RiskController;

/// Health factor of exactly 1.0
pub const HEALTH_FACTOR_ONE: u128 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub loan_id: String,
    /// None when no price is available
    pub health_factor_bps: Option<u128>,
    pub collateral_value: Option<u128>,
    pub debt: u128,
    pub price_fresh: bool,
    /// False whenever the price is missing or stale
    pub healthy: bool,
    pub unhealthy_since: Option<DateTime<Utc>>,
    /// When the grace period ends, if the position is unhealthy
    pub liquidatable_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayOutcome {
    pub loan: Loan,
    pub interest_paid: u128,
    pub principal_paid: u128,
    pub closed: bool,
}

/// A liquidation that must be reflected in the borrower's reputation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultEvent {
    pub borrower: String,
    pub loan_id: String,
    pub debt: u128,
    pub shortfall: u128,
    pub shortfall_ratio_bps: u32,
    pub severity: SlashSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillOutcome {
    pub auction: LiquidationAuction,
    pub loan: Loan,
    pub price: u128,
    pub debt_repaid: u128,
    pub surplus: u128,
    pub shortfall: u128,
    pub default: DefaultEvent,
}

struct PriceCheck {
    value: u128,
    fresh: bool,
    age_secs: i64,
}

pub struct CreditEngine {
    config: CreditConfig,
    severity: SlashSeverityTable,
    loans: DashMap<String, Loan>,
    auctions: DashMap<String, LiquidationAuction>,
    history: DashMap<String, LoanHistory>,
    reputation: Arc<dyn ReputationReader>,
    oracle: Arc<dyn PriceOracle>,
    risk: Arc<RiskController>,
    ledger: Arc<StakeLedger>,
    audit: Arc<AuditLogger>,
}

impl CreditEngine {
    pub fn new(
        config: CreditConfig,
        severity: SlashSeverityTable,
        reputation: Arc<dyn ReputationReader>,
        oracle: Arc<dyn PriceOracle>,
        risk: Arc<RiskController>,
        ledger: Arc<StakeLedger>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            config,
            severity,
            loans: DashMap::new(),
            auctions: DashMap::new(),
            history: DashMap::new(),
            reputation,
            oracle,
            risk,
            ledger,
            audit,
        }
    }

    pub fn get_loan(&self, loan_id: &str) -> Option<Loan> {
        self.loans.get(loan_id).map(|l| l.clone())
    }

    pub fn get_auction(&self, auction_id: &str) -> Option<LiquidationAuction> {
        self.auctions.get(auction_id).map(|a| a.clone())
    }

    pub fn loans_for(&self, borrower: &str) -> Vec<Loan> {
        let mut loans: Vec<Loan> = self
            .loans
            .iter()
            .filter(|l| l.borrower == borrower)
            .map(|l| l.clone())
            .collect();
        loans.sort_by_key(|l| l.start_time);
        loans
    }

    /// Track record consumed by reputation scoring
    pub fn loan_history(&self, borrower: &str) -> LoanHistory {
        self.history
            .get(borrower)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// USD value of `amount` collateral, or why it cannot be priced
    fn value_collateral(&self, asset: &str, amount: u128, now: DateTime<Utc>) -> EngineResult<PriceCheck> {
        let quote = self
            .oracle
            .get_price(asset)
            .ok_or_else(|| EngineError::PriceUnavailable(asset.to_string()))?;
        let age_secs = (now - quote.timestamp).num_seconds();
        let value = mul_div(amount, quote.price, COLLATERAL_UNIT)?;
        Ok(PriceCheck {
            value,
            fresh: age_secs <= self.config.price_staleness_secs,
            age_secs,
        })
    }

    /// Like [`value_collateral`](Self::value_collateral) but a stale price is an error
    fn fresh_value(&self, asset: &str, amount: u128, now: DateTime<Utc>) -> EngineResult<u128> {
        let check = self.value_collateral(asset, amount, now)?;
        if !check.fresh {
            return Err(EngineError::StalePrice {
                asset: asset.to_string(),
                age_secs: check.age_secs,
            });
        }
        Ok(check.value)
    }

    /// Open a loan sized by the borrower's reputation tier
    pub fn borrow(
        &self,
        borrower: &str,
        collateral_asset: &str,
        collateral_amount: u128,
        principal: u128,
        now: DateTime<Utc>,
    ) -> EngineResult<Loan> {
        if borrower.trim().is_empty() || collateral_asset.trim().is_empty() {
            return Err(EngineError::InvalidLoanParameters(
                "borrower and collateral asset are required".to_string(),
            ));
        }
        if collateral_amount == 0 || principal == 0 {
            return Err(EngineError::InvalidLoanParameters(
                "collateral and principal must be positive".to_string(),
            ));
        }
        if self.risk.is_paused() {
            return Err(EngineError::CircuitBreakerTripped);
        }

        let standing = self.reputation.standing(borrower, now);
        standing.ensure_can_borrow(now)?;

        let collateral_value = self.fresh_value(collateral_asset, collateral_amount, now)?;
        if collateral_value == 0 {
            return Err(EngineError::InvalidLoanParameters(
                "collateral has no value".to_string(),
            ));
        }
        let requested_ltv_bps = principal
            .checked_mul(10_000)
            .ok_or(EngineError::Overflow("ltv"))?
            .div_ceil(collateral_value);
        let policy = standing.policy;
        if requested_ltv_bps > policy.max_ltv_bps as u128 {
            return Err(EngineError::InsufficientReputation {
                tier: policy.tier.to_string(),
                max_ltv_bps: policy.max_ltv_bps,
                requested_ltv_bps,
            });
        }

        let loan_id = format!("loan_{}", uuid::Uuid::new_v4().simple());
        let loan = Loan {
            id: loan_id.clone(),
            borrower: borrower.to_string(),
            collateral_asset: collateral_asset.to_string(),
            collateral_amount,
            principal,
            outstanding_principal: principal,
            accrued_interest: 0,
            ltv_bps: requested_ltv_bps as u32,
            tier: policy.tier,
            interest_rate_bps: policy.interest_rate_bps,
            liquidation_threshold_bps: policy.liquidation_threshold_bps,
            grace_period_secs: policy.grace_period_secs,
            start_time: now,
            last_accrual_time: now,
            status: LoanStatus::Active,
            health_factor_bps: Some(health_factor(
                collateral_value,
                policy.liquidation_threshold_bps,
                principal,
            )),
            unhealthy_since: None,
            auction_id: None,
            closed_at: None,
        };

        // Effects: volume first (may trip the breaker), then the ledger batch
        let window = self.risk.window_start();
        self.risk.record_volume(principal, now)?;

        let batch = [
            Transfer::new(
                AccountKey::wallet(borrower),
                AccountKey::collateral_custody(&loan_id),
                collateral_asset,
                collateral_amount,
                TransferType::CollateralLock,
            ),
            Transfer::new(
                AccountKey::lending_pool(),
                AccountKey::wallet(borrower),
                ASSET_USD,
                principal,
                TransferType::PrincipalDisbursement,
            ),
        ];
        if let Err(e) = self.ledger.commit(&batch, now) {
            self.risk.release_volume(principal, window);
            return Err(e);
        }

        self.loans.insert(loan_id.clone(), loan.clone());
        {
            let mut history = self.history.entry(borrower.to_string()).or_default();
            history.loans_opened += 1;
            history.total_borrowed = history.total_borrowed.saturating_add(principal);
            history.cumulative_ltv_bps = history.cumulative_ltv_bps.saturating_add(requested_ltv_bps);
        }

        info!(
            loan_id = %loan_id,
            borrower = %borrower,
            principal = %principal,
            ltv_bps = loan.ltv_bps,
            tier = %policy.tier,
            "Loan opened"
        );
        Ok(loan)
    }

    /// Accrue interest on a loan up to `now`
    pub fn accrue_interest(&self, loan_id: &str, now: DateTime<Utc>) -> EngineResult<Loan> {
        let mut loan = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(loan_id.to_string()))?;
        if !loan.is_open() {
            return Err(EngineError::LoanNotActive {
                loan_id: loan_id.to_string(),
            });
        }
        loan.accrue(now)?;
        Ok(loan.clone())
    }

    /// Pay down a loan, interest first. Allowed while paused and on probation.
    pub fn repay(&self, loan_id: &str, amount: u128, now: DateTime<Utc>) -> EngineResult<RepayOutcome> {
        if amount == 0 {
            return Err(EngineError::InvalidLoanParameters(
                "repayment must be positive".to_string(),
            ));
        }
        let mut entry = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(loan_id.to_string()))?;
        match entry.status {
            LoanStatus::Active => {}
            LoanStatus::Liquidating => {
                return Err(EngineError::LiquidationInProgress(loan_id.to_string()));
            }
            LoanStatus::Repaid | LoanStatus::Liquidated => {
                return Err(EngineError::LoanNotActive {
                    loan_id: loan_id.to_string(),
                });
            }
        }

        // Work on a copy so a failed ledger batch leaves the loan untouched
        let mut loan = entry.clone();
        loan.accrue(now)?;
        let payment = amount.min(loan.debt());
        let interest_paid = payment.min(loan.accrued_interest);
        let principal_paid = payment - interest_paid;
        loan.accrued_interest -= interest_paid;
        loan.outstanding_principal -= principal_paid;
        let closed = loan.debt() == 0;

        let mut batch = vec![Transfer::new(
            AccountKey::wallet(&loan.borrower),
            AccountKey::lending_pool(),
            ASSET_USD,
            payment,
            TransferType::Repayment,
        )];
        if closed {
            batch.push(Transfer::new(
                AccountKey::collateral_custody(loan_id),
                AccountKey::wallet(&loan.borrower),
                &loan.collateral_asset,
                loan.collateral_amount,
                TransferType::CollateralRelease,
            ));
            loan.status = LoanStatus::Repaid;
            loan.closed_at = Some(now);
            loan.unhealthy_since = None;
        }
        self.ledger.commit(&batch, now)?;
        *entry = loan.clone();
        drop(entry);

        {
            let mut history = self.history.entry(loan.borrower.clone()).or_default();
            history.total_repaid = history.total_repaid.saturating_add(payment);
            if closed {
                history.loans_repaid += 1;
            }
        }

        debug!(
            loan_id = %loan_id,
            interest_paid = %interest_paid,
            principal_paid = %principal_paid,
            closed,
            "Repayment applied"
        );
        Ok(RepayOutcome {
            loan,
            interest_paid,
            principal_paid,
            closed,
        })
    }

    fn report(&self, loan: &Loan, debt: u128, now: DateTime<Utc>) -> HealthReport {
        let (health_factor_bps, collateral_value, price_fresh) =
            match self.value_collateral(&loan.collateral_asset, loan.collateral_amount, now) {
                Ok(check) => (
                    Some(health_factor(check.value, loan.liquidation_threshold_bps, debt)),
                    Some(check.value),
                    check.fresh,
                ),
                Err(_) => (None, None, false),
            };
        let healthy = price_fresh && health_factor_bps.is_some_and(|hf| hf >= HEALTH_FACTOR_ONE);
        let unhealthy_since = if healthy {
            None
        } else {
            Some(loan.unhealthy_since.unwrap_or(now))
        };

        HealthReport {
            loan_id: loan.id.clone(),
            health_factor_bps,
            collateral_value,
            debt,
            price_fresh,
            healthy,
            unhealthy_since,
            liquidatable_at: unhealthy_since.map(|since| since + Duration::seconds(loan.grace_period_secs)),
        }
    }

    /// Read-only health check. Missing or stale prices report unhealthy.
    pub fn compute_health_factor(&self, loan_id: &str, now: DateTime<Utc>) -> EngineResult<HealthReport> {
        let loan = self
            .get_loan(loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(loan_id.to_string()))?;
        let debt = loan.debt_at(now)?;
        Ok(self.report(&loan, debt, now))
    }

    /// Health check that records the observation, starting or clearing the grace clock
    pub fn poke_health(&self, loan_id: &str, now: DateTime<Utc>) -> EngineResult<HealthReport> {
        let mut loan = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(loan_id.to_string()))?;
        if loan.status != LoanStatus::Active {
            return Err(EngineError::LoanNotActive {
                loan_id: loan_id.to_string(),
            });
        }
        loan.accrue(now)?;
        let report = self.report(&loan, loan.debt(), now);

        if report.health_factor_bps.is_some() {
            loan.health_factor_bps = report.health_factor_bps;
        }
        if loan.unhealthy_since.is_none() && !report.healthy {
            warn!(
                loan_id = %loan_id,
                health_factor_bps = ?report.health_factor_bps,
                price_fresh = report.price_fresh,
                "Position became unhealthy"
            );
        }
        loan.unhealthy_since = report.unhealthy_since;
        Ok(report)
    }

    /// Open a Dutch auction for an unhealthy loan whose grace period has run out
    ///
    /// A fresh price is required to set auction prices. A failed attempt
    /// leaves the loan untouched.
    pub fn start_liquidation(&self, loan_id: &str, now: DateTime<Utc>) -> EngineResult<LiquidationAuction> {
        let mut loan = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(loan_id.to_string()))?;
        match loan.status {
            LoanStatus::Active => {}
            LoanStatus::Liquidating => {
                return Err(EngineError::LiquidationInProgress(loan_id.to_string()));
            }
            _ => {
                return Err(EngineError::LoanNotActive {
                    loan_id: loan_id.to_string(),
                });
            }
        }

        let fair_value = self.fresh_value(&loan.collateral_asset, loan.collateral_amount, now)?;
        let debt = loan.debt_at(now)?;
        let hf = health_factor(fair_value, loan.liquidation_threshold_bps, debt);
        if hf >= HEALTH_FACTOR_ONE {
            return Err(EngineError::PositionHealthy {
                health_factor_bps: hf,
            });
        }

        // Only poke_health starts the grace clock
        let since = loan.unhealthy_since.unwrap_or(now);
        let grace_ends = since + Duration::seconds(loan.grace_period_secs);
        if now < grace_ends {
            return Err(EngineError::GracePeriodActive { until: grace_ends });
        }

        loan.accrue(now)?;
        let auction = LiquidationAuction {
            id: format!("auction_{}", uuid::Uuid::new_v4().simple()),
            loan_id: loan_id.to_string(),
            borrower: loan.borrower.clone(),
            collateral_asset: loan.collateral_asset.clone(),
            collateral_amount: loan.collateral_amount,
            start_price: mul_div(fair_value, 10_000 + self.config.auction_premium_bps as u128, 10_000)?,
            floor_price: mul_div(
                fair_value,
                10_000 - self.config.auction_max_discount_bps.min(10_000) as u128,
                10_000,
            )?,
            start_time: now,
            duration_seconds: self.config.auction_duration_secs,
            curve: self.config.auction_curve,
            status: AuctionStatus::Open,
        };
        loan.status = LoanStatus::Liquidating;
        loan.health_factor_bps = Some(hf);
        loan.auction_id = Some(auction.id.clone());
        drop(loan);

        self.auctions.insert(auction.id.clone(), auction.clone());

        warn!(
            loan_id = %loan_id,
            auction_id = %auction.id,
            health_factor_bps = %hf,
            start_price = %auction.start_price,
            floor_price = %auction.floor_price,
            "Liquidation started"
        );
        self.audit.record(
            AuditEventType::LiquidationStarted {
                loan_id: loan_id.to_string(),
                auction_id: auction.id.clone(),
            },
            AuditSeverity::Warning,
            now,
        );
        Ok(auction)
    }

    /// Buy the collateral at the current quote. First fill wins.
    pub fn fill(&self, auction_id: &str, liquidator: &str, now: DateTime<Utc>) -> EngineResult<FillOutcome> {
        let mut auction = self
            .auctions
            .get_mut(auction_id)
            .ok_or_else(|| EngineError::AuctionNotFound(auction_id.to_string()))?;
        if !auction.is_open() {
            return Err(EngineError::AuctionAlreadySettled(auction_id.to_string()));
        }

        let mut loan_entry = self
            .loans
            .get_mut(&auction.loan_id)
            .ok_or_else(|| EngineError::LoanNotFound(auction.loan_id.clone()))?;
        let mut loan = loan_entry.clone();
        loan.accrue(now)?;

        let price = auction.quote(now);
        let debt = loan.debt();
        let debt_repaid = price.min(debt);
        let surplus = price - debt_repaid;
        let shortfall = debt - debt_repaid;

        let mut batch = vec![Transfer::new(
            AccountKey::collateral_custody(&loan.id),
            AccountKey::wallet(liquidator),
            &loan.collateral_asset,
            loan.collateral_amount,
            TransferType::CollateralSeize,
        )];
        let mut push_usd = |from: AccountKey, to: AccountKey, amount: u128, kind: TransferType| {
            if amount > 0 {
                batch.push(Transfer::new(from, to, ASSET_USD, amount, kind));
            }
        };
        push_usd(
            AccountKey::wallet(liquidator),
            AccountKey::lending_pool(),
            debt_repaid,
            TransferType::LiquidationProceeds,
        );
        push_usd(
            AccountKey::wallet(liquidator),
            AccountKey::wallet(&loan.borrower),
            surplus,
            TransferType::SurplusReturn,
        );
        push_usd(
            AccountKey::bad_debt_reserve(),
            AccountKey::lending_pool(),
            shortfall,
            TransferType::BadDebtWriteOff,
        );
        self.ledger.commit(&batch, now)?;

        auction.status = AuctionStatus::Settled {
            liquidator: liquidator.to_string(),
            price,
            settled_at: now,
        };
        loan.status = LoanStatus::Liquidated;
        loan.closed_at = Some(now);
        loan.outstanding_principal = 0;
        loan.accrued_interest = 0;
        *loan_entry = loan.clone();
        let settled = auction.clone();
        drop(loan_entry);
        drop(auction);

        {
            let mut history = self.history.entry(loan.borrower.clone()).or_default();
            history.loans_liquidated += 1;
            history.total_repaid = history.total_repaid.saturating_add(debt_repaid);
        }

        let shortfall_ratio_bps = if debt == 0 {
            0
        } else {
            mul_div(shortfall, 10_000, debt)?.min(10_000) as u32
        };
        let default = DefaultEvent {
            borrower: loan.borrower.clone(),
            loan_id: loan.id.clone(),
            debt,
            shortfall,
            shortfall_ratio_bps,
            severity: self.severity.classify(shortfall, debt),
        };

        info!(
            auction_id = %auction_id,
            liquidator = %liquidator,
            price = %price,
            shortfall = %shortfall,
            severity = ?default.severity,
            "Auction filled"
        );
        self.audit.record(
            AuditEventType::AuctionFilled {
                auction_id: auction_id.to_string(),
                liquidator: liquidator.to_string(),
                price,
            },
            AuditSeverity::Warning,
            now,
        );

        Ok(FillOutcome {
            auction: settled,
            loan,
            price,
            debt_repaid,
            surplus,
            shortfall,
            default,
        })
    }
}

/// `collateral_value × liquidation_threshold / debt`, in bps
pub(crate) fn health_factor(collateral_value: u128, liquidation_threshold_bps: u32, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    let weighted = collateral_value.saturating_mul(liquidation_threshold_bps as u128);
    weighted / debt
}

fn mul_div(a: u128, b: u128, c: u128) -> EngineResult<u128> {
    a.checked_mul(b)
        .map(|v| v / c)
        .ok_or(EngineError::Overflow("price arithmetic"))
}
