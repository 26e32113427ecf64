use serde::{Deserialize, Serialize};

use super::accounts::AccountKey;

pub mod transfer_codes {
    pub const STAKE_ESCROW: u16 = 1;
    pub const STAKE_REFUND: u16 = 2;
    pub const STAKE_FORFEIT: u16 = 3;
    pub const DISPUTE_REWARD: u16 = 4;
    pub const COLLATERAL_LOCK: u16 = 10;
    pub const COLLATERAL_RELEASE: u16 = 11;
    pub const COLLATERAL_SEIZE: u16 = 12;
    pub const PRINCIPAL_DISBURSEMENT: u16 = 20;
    pub const REPAYMENT: u16 = 21;
    pub const LIQUIDATION_PROCEEDS: u16 = 22;
    pub const SURPLUS_RETURN: u16 = 23;
    pub const BAD_DEBT_WRITE_OFF: u16 = 24;
    pub const POOL_FUNDING: u16 = 30;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferType {
    StakeEscrow,
    StakeRefund,
    StakeForfeit,
    DisputeReward,
    CollateralLock,
    CollateralRelease,
    CollateralSeize,
    PrincipalDisbursement,
    Repayment,
    LiquidationProceeds,
    SurplusReturn,
    BadDebtWriteOff,
    PoolFunding,
}

impl TransferType {
    pub fn code(&self) -> u16 {
        match self {
            TransferType::StakeEscrow => transfer_codes::STAKE_ESCROW,
            TransferType::StakeRefund => transfer_codes::STAKE_REFUND,
            TransferType::StakeForfeit => transfer_codes::STAKE_FORFEIT,
            TransferType::DisputeReward => transfer_codes::DISPUTE_REWARD,
            TransferType::CollateralLock => transfer_codes::COLLATERAL_LOCK,
            TransferType::CollateralRelease => transfer_codes::COLLATERAL_RELEASE,
            TransferType::CollateralSeize => transfer_codes::COLLATERAL_SEIZE,
            TransferType::PrincipalDisbursement => transfer_codes::PRINCIPAL_DISBURSEMENT,
            TransferType::Repayment => transfer_codes::REPAYMENT,
            TransferType::LiquidationProceeds => transfer_codes::LIQUIDATION_PROCEEDS,
            TransferType::SurplusReturn => transfer_codes::SURPLUS_RETURN,
            TransferType::BadDebtWriteOff => transfer_codes::BAD_DEBT_WRITE_OFF,
            TransferType::PoolFunding => transfer_codes::POOL_FUNDING,
        }
    }
}

/// A single movement of one asset between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub debit: AccountKey,
    pub credit: AccountKey,
    pub asset: String,
    pub amount: u128,
    pub transfer_type: TransferType,
}

impl Transfer {
    pub fn new(
        debit: AccountKey,
        credit: AccountKey,
        asset: &str,
        amount: u128,
        transfer_type: TransferType,
    ) -> Self {
        Self {
            debit,
            credit,
            asset: asset.to_string(),
            amount,
            transfer_type,
        }
    }
}
