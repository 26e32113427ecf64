use anyhow::{Result, anyhow};
use dashmap::DashMap;
use std::collections::BTreeMap;

use crate::claims::BalanceSample;

/// Historical balance evidence. The engine never scans the chain itself.
pub trait BalanceIndexer: Send + Sync {
    fn balances_at(&self, address: &str, blocks: &[u64]) -> Result<Vec<BalanceSample>>;
}

/// Balance history keyed by address; a block reads the latest change at or before it
#[derive(Debug, Default)]
pub struct InMemoryIndexer {
    history: DashMap<String, BTreeMap<u64, u128>>,
}

impl InMemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_balance(&self, address: &str, block: u64, balance: u128) {
        self.history
            .entry(address.to_string())
            .or_default()
            .insert(block, balance);
    }
}

/// Write side used when balance history is pushed rather than scanned
pub trait BalanceRecorder: Send + Sync {
    fn record(&self, address: &str, block: u64, balance: u128);
}

impl BalanceRecorder for InMemoryIndexer {
    fn record(&self, address: &str, block: u64, balance: u128) {
        self.record_balance(address, block, balance);
    }
}

impl BalanceIndexer for InMemoryIndexer {
    fn balances_at(&self, address: &str, blocks: &[u64]) -> Result<Vec<BalanceSample>> {
        let history = self
            .history
            .get(address)
            .ok_or_else(|| anyhow!("No balance history indexed for {}", address))?;

        Ok(blocks
            .iter()
            .map(|&block| BalanceSample {
                block,
                balance: history
                    .range(..=block)
                    .next_back()
                    .map(|(_, balance)| *balance)
                    .unwrap_or(0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_lookup_uses_latest_change() {
        let indexer = InMemoryIndexer::new();
        indexer.record_balance("0xabc", 100, 5);
        indexer.record_balance("0xabc", 300, 12);

        let samples = indexer.balances_at("0xabc", &[50, 100, 250, 300, 900]).unwrap();
        let balances: Vec<u128> = samples.iter().map(|s| s.balance).collect();
        assert_eq!(balances, vec![0, 5, 5, 12, 12]);
    }

    #[test]
    fn test_unknown_address_errors() {
        let indexer = InMemoryIndexer::new();
        assert!(indexer.balances_at("0xdead", &[1]).is_err());
    }
}
