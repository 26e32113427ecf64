//! Reputation-priced credit
//!
//! Loans are sized and priced by the borrower's reputation tier, monitored by
//! health factor, and closed either by repayment or by a Dutch liquidation
//! auction. Filled auctions report a [`DefaultEvent`] for the caller to turn
//! into a slash; this module only reads reputation.

mod auction;
mod engine;
mod loan;

pub use auction::{AuctionCurve, AuctionStatus, LiquidationAuction};
pub use engine::{CreditEngine, DefaultEvent, FillOutcome, HealthReport, RepayOutcome};
pub use loan::{Loan, LoanStatus, SECONDS_PER_YEAR, accrued_interest};
