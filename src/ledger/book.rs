use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use super::accounts::AccountKey;
use super::transfers::{Transfer, TransferType};
use crate::error::{EngineError, EngineResult};

/// A transfer as recorded by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedTransfer {
    pub id: u64,
    pub batch_id: u64,
    pub transfer: Transfer,
    pub posted_at: DateTime<Utc>,
}

/// Posted transfers retained for inspection; balances are never trimmed
const DEFAULT_POSTED_CAPACITY: usize = 100_000;

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<(AccountKey, String), i128>,
    posted: VecDeque<PostedTransfer>,
    next_transfer_id: u64,
    next_batch_id: u64,
}

impl LedgerState {
    fn balance(&self, account: &AccountKey, asset: &str) -> i128 {
        self.balances
            .get(&(account.clone(), asset.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Compute post-batch balances for every touched account without applying them
    fn stage(&self, batch: &[Transfer]) -> EngineResult<HashMap<(AccountKey, String), i128>> {
        let mut staged: HashMap<(AccountKey, String), i128> = HashMap::new();

        for transfer in batch {
            if transfer.debit == transfer.credit {
                return Err(EngineError::InvalidLoanParameters(format!(
                    "transfer from {} to itself",
                    transfer.debit
                )));
            }
            let amount =
                i128::try_from(transfer.amount).map_err(|_| EngineError::Overflow("ledger"))?;

            let debit_key = (transfer.debit.clone(), transfer.asset.clone());
            let debit_balance = match staged.get(&debit_key) {
                Some(b) => *b,
                None => self.balance(&transfer.debit, &transfer.asset),
            };
            let new_debit = debit_balance
                .checked_sub(amount)
                .ok_or(EngineError::Overflow("ledger"))?;
            if new_debit < 0 && !transfer.debit.kind.is_external() {
                return Err(EngineError::InsufficientFunds {
                    account: transfer.debit.to_string(),
                    required: transfer.amount,
                    available: debit_balance.max(0) as u128,
                });
            }
            staged.insert(debit_key, new_debit);

            let credit_key = (transfer.credit.clone(), transfer.asset.clone());
            let credit_balance = match staged.get(&credit_key) {
                Some(b) => *b,
                None => self.balance(&transfer.credit, &transfer.asset),
            };
            let new_credit = credit_balance
                .checked_add(amount)
                .ok_or(EngineError::Overflow("ledger"))?;
            staged.insert(credit_key, new_credit);
        }

        Ok(staged)
    }
}

/// In-process linked-batch ledger
#[derive(Debug)]
pub struct StakeLedger {
    state: Mutex<LedgerState>,
    max_posted: usize,
}

impl Default for StakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StakeLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            max_posted: DEFAULT_POSTED_CAPACITY,
        }
    }

    /// Bound the posted-transfer log; the oldest entries are dropped first
    pub fn with_capacity(mut self, max_posted: usize) -> Self {
        self.max_posted = max_posted.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn balance(&self, account: &AccountKey, asset: &str) -> i128 {
        self.lock().balance(account, asset)
    }

    /// Validate a batch without posting it
    pub fn check(&self, batch: &[Transfer]) -> EngineResult<()> {
        self.lock().stage(batch).map(|_| ())
    }

    /// Post a batch atomically. Returns the batch id.
    pub fn commit(&self, batch: &[Transfer], at: DateTime<Utc>) -> EngineResult<u64> {
        let mut state = self.lock();
        let staged = state.stage(batch)?;

        state.next_batch_id += 1;
        let batch_id = state.next_batch_id;

        for (key, balance) in staged {
            state.balances.insert(key, balance);
        }
        for transfer in batch {
            state.next_transfer_id += 1;
            let id = state.next_transfer_id;
            debug!(
                batch_id,
                transfer_id = id,
                code = transfer.transfer_type.code(),
                debit = %transfer.debit,
                credit = %transfer.credit,
                amount = %transfer.amount,
                asset = %transfer.asset,
                "Posted transfer"
            );
            state.posted.push_back(PostedTransfer {
                id,
                batch_id,
                transfer: transfer.clone(),
                posted_at: at,
            });
        }
        while state.posted.len() > self.max_posted {
            state.posted.pop_front();
        }

        Ok(batch_id)
    }

    /// Seed pool liquidity from an external funder
    pub fn fund(
        &self,
        funder: &str,
        account: AccountKey,
        asset: &str,
        amount: u128,
        at: DateTime<Utc>,
    ) -> EngineResult<u64> {
        self.commit(
            &[Transfer::new(
                AccountKey::wallet(funder),
                account,
                asset,
                amount,
                TransferType::PoolFunding,
            )],
            at,
        )
    }

    /// Retained transfers touching `account`, oldest first
    pub fn transfers_for(&self, account: &AccountKey) -> Vec<PostedTransfer> {
        self.lock()
            .posted
            .iter()
            .filter(|p| &p.transfer.debit == account || &p.transfer.credit == account)
            .cloned()
            .collect()
    }

    pub fn transfer_count(&self) -> usize {
        self.lock().posted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ASSET_ETH;

    #[test]
    fn test_batch_is_all_or_nothing() {
        let ledger = StakeLedger::new();
        let now = Utc::now();

        ledger
            .commit(
                &[Transfer::new(
                    AccountKey::wallet("alice"),
                    AccountKey::claim_escrow("c1"),
                    ASSET_ETH,
                    100,
                    TransferType::StakeEscrow,
                )],
                now,
            )
            .unwrap();

        // Second leg overdraws the escrow, so the first leg must not post either
        let result = ledger.commit(
            &[
                Transfer::new(
                    AccountKey::claim_escrow("c1"),
                    AccountKey::wallet("alice"),
                    ASSET_ETH,
                    60,
                    TransferType::StakeRefund,
                ),
                Transfer::new(
                    AccountKey::claim_escrow("c1"),
                    AccountKey::reward_pool(),
                    ASSET_ETH,
                    60,
                    TransferType::StakeForfeit,
                ),
            ],
            now,
        );

        assert!(matches!(result, Err(EngineError::InsufficientFunds { .. })));
        assert_eq!(ledger.balance(&AccountKey::claim_escrow("c1"), ASSET_ETH), 100);
        assert_eq!(ledger.balance(&AccountKey::wallet("alice"), ASSET_ETH), -100);
        assert_eq!(ledger.transfer_count(), 1);
    }

    #[test]
    fn test_external_wallets_may_go_negative() {
        let ledger = StakeLedger::new();
        ledger
            .fund("treasury_ops", AccountKey::lending_pool(), "USD", 1_000, Utc::now())
            .unwrap();
        assert_eq!(ledger.balance(&AccountKey::lending_pool(), "USD"), 1_000);
        assert_eq!(ledger.balance(&AccountKey::wallet("treasury_ops"), "USD"), -1_000);
    }

    #[test]
    fn test_transfers_for_account() {
        let ledger = StakeLedger::new();
        let now = Utc::now();
        ledger
            .fund("funder", AccountKey::reward_pool(), ASSET_ETH, 5, now)
            .unwrap();
        ledger
            .fund("funder", AccountKey::treasury(), ASSET_ETH, 5, now)
            .unwrap();

        assert_eq!(ledger.transfers_for(&AccountKey::reward_pool()).len(), 1);
        assert_eq!(ledger.transfers_for(&AccountKey::wallet("funder")).len(), 2);
    }

    #[test]
    fn test_posted_log_is_bounded() {
        let ledger = StakeLedger::new().with_capacity(2);
        let now = Utc::now();
        for _ in 0..5 {
            ledger
                .fund("funder", AccountKey::reward_pool(), ASSET_ETH, 1, now)
                .unwrap();
        }

        assert_eq!(ledger.transfer_count(), 2);
        let kept: Vec<u64> = ledger
            .transfers_for(&AccountKey::reward_pool())
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(kept, vec![4, 5]);
        // Trimming the log never touches balances
        assert_eq!(ledger.balance(&AccountKey::reward_pool(), ASSET_ETH), 5);
    }
}
