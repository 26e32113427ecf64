//! Internal stake and collateral ledger
//!
//! Double-entry accounting for claim stakes, loan collateral, pool
//! liquidity, rewards, and bad debt. Batches are linked: every transfer in a
//! batch posts or none does.

mod accounts;
mod book;
mod transfers;

pub use accounts::{ASSET_ETH, ASSET_USD, AccountKey, AccountKind, account_codes};
pub use book::{PostedTransfer, StakeLedger};
pub use transfers::{Transfer, TransferType, transfer_codes};
