use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::reputation::ReputationTier;

pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Liquidating,
    Repaid,
    Liquidated,
}

/// A collateralized loan. Debt is in micro-USD; collateral in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub borrower: String,
    pub collateral_asset: String,
    pub collateral_amount: u128,
    /// Principal at origination
    pub principal: u128,
    pub outstanding_principal: u128,
    pub accrued_interest: u128,
    pub ltv_bps: u32,
    pub tier: ReputationTier,
    pub interest_rate_bps: u32,
    pub liquidation_threshold_bps: u32,
    pub grace_period_secs: i64,
    pub start_time: DateTime<Utc>,
    pub last_accrual_time: DateTime<Utc>,
    pub status: LoanStatus,
    /// Last observed health factor, 10_000 = 1.0
    pub health_factor_bps: Option<u128>,
    pub unhealthy_since: Option<DateTime<Utc>>,
    pub auction_id: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn debt(&self) -> u128 {
        self.outstanding_principal.saturating_add(self.accrued_interest)
    }

    /// Debt as of `now` without mutating the loan
    pub fn debt_at(&self, now: DateTime<Utc>) -> EngineResult<u128> {
        let interest = accrued_interest(
            self.outstanding_principal,
            self.interest_rate_bps,
            (now - self.last_accrual_time).num_seconds(),
        )?;
        self.debt()
            .checked_add(interest)
            .ok_or(EngineError::Overflow("loan debt"))
    }

    /// Bring interest up to `now`. Closed form, so cost does not grow with time.
    pub fn accrue(&mut self, now: DateTime<Utc>) -> EngineResult<u128> {
        if now <= self.last_accrual_time {
            return Ok(0);
        }
        let interest = accrued_interest(
            self.outstanding_principal,
            self.interest_rate_bps,
            (now - self.last_accrual_time).num_seconds(),
        )?;
        self.accrued_interest = self
            .accrued_interest
            .checked_add(interest)
            .ok_or(EngineError::Overflow("loan interest"))?;
        self.last_accrual_time = now;
        Ok(interest)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, LoanStatus::Active | LoanStatus::Liquidating)
    }
}

/// Simple interest on `principal` over `elapsed_secs`, rounded up
///
/// Accrued interest never bears interest itself, so splitting an interval
/// into several accruals yields the same total (up to rounding).
pub fn accrued_interest(principal: u128, rate_bps: u32, elapsed_secs: i64) -> EngineResult<u128> {
    if elapsed_secs <= 0 || principal == 0 || rate_bps == 0 {
        return Ok(0);
    }
    let numerator = principal
        .checked_mul(rate_bps as u128)
        .and_then(|v| v.checked_mul(elapsed_secs as u128))
        .ok_or(EngineError::Overflow("interest accrual"))?;
    let denominator = 10_000 * SECONDS_PER_YEAR;
    Ok(numerator.div_ceil(denominator))
}
