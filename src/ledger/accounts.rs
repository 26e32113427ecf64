use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset symbol for claim and challenge stakes
pub const ASSET_ETH: &str = "ETH";

/// Asset symbol for loan principal and debt (micro-USD)
pub const ASSET_USD: &str = "USD";

pub mod account_codes {
    pub const LENDING_POOL: u16 = 1;
    pub const REWARD_POOL: u16 = 2;
    pub const TREASURY: u16 = 3;
    pub const BAD_DEBT_RESERVE: u16 = 4;
    pub const WALLET: u16 = 10;
    pub const CLAIM_ESCROW: u16 = 20;
    pub const COLLATERAL_CUSTODY: u16 = 21;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountKind {
    LendingPool,
    RewardPool,
    Treasury,
    BadDebtReserve,
    /// Funds outside the engine; may run negative
    Wallet,
    ClaimEscrow,
    CollateralCustody,
}

impl AccountKind {
    pub fn code(&self) -> u16 {
        match self {
            AccountKind::LendingPool => account_codes::LENDING_POOL,
            AccountKind::RewardPool => account_codes::REWARD_POOL,
            AccountKind::Treasury => account_codes::TREASURY,
            AccountKind::BadDebtReserve => account_codes::BAD_DEBT_RESERVE,
            AccountKind::Wallet => account_codes::WALLET,
            AccountKind::ClaimEscrow => account_codes::CLAIM_ESCROW,
            AccountKind::CollateralCustody => account_codes::COLLATERAL_CUSTODY,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            account_codes::LENDING_POOL => Some(AccountKind::LendingPool),
            account_codes::REWARD_POOL => Some(AccountKind::RewardPool),
            account_codes::TREASURY => Some(AccountKind::Treasury),
            account_codes::BAD_DEBT_RESERVE => Some(AccountKind::BadDebtReserve),
            account_codes::WALLET => Some(AccountKind::Wallet),
            account_codes::CLAIM_ESCROW => Some(AccountKind::ClaimEscrow),
            account_codes::COLLATERAL_CUSTODY => Some(AccountKind::CollateralCustody),
            _ => None,
        }
    }

    /// Accounts allowed to go negative
    pub fn is_external(&self) -> bool {
        matches!(self, AccountKind::Wallet | AccountKind::BadDebtReserve)
    }
}

/// Ledger account identity: a kind plus an owner (address, claim, or loan id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub kind: AccountKind,
    pub owner: String,
}

impl AccountKey {
    fn protocol(kind: AccountKind) -> Self {
        Self {
            kind,
            owner: String::new(),
        }
    }

    pub fn lending_pool() -> Self {
        Self::protocol(AccountKind::LendingPool)
    }

    pub fn reward_pool() -> Self {
        Self::protocol(AccountKind::RewardPool)
    }

    pub fn treasury() -> Self {
        Self::protocol(AccountKind::Treasury)
    }

    pub fn bad_debt_reserve() -> Self {
        Self::protocol(AccountKind::BadDebtReserve)
    }

    pub fn wallet(address: &str) -> Self {
        Self {
            kind: AccountKind::Wallet,
            owner: address.to_string(),
        }
    }

    pub fn claim_escrow(claim_id: &str) -> Self {
        Self {
            kind: AccountKind::ClaimEscrow,
            owner: claim_id.to_string(),
        }
    }

    pub fn collateral_custody(loan_id: &str) -> Self {
        Self {
            kind: AccountKind::CollateralCustody,
            owner: loan_id.to_string(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{:?}:{}", self.kind, self.owner)
        }
    }
}
