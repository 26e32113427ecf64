use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::types::{BalanceSample, Claim};
use crate::crypto::{SampleTree, hash};
use crate::external::BalanceIndexer;

/// `SHA-256(merkle_root || min_balance || sample_blocks...)`, little-endian integers
pub fn public_input_hash(merkle_root: &[u8; 32], min_balance: u128, sample_blocks: &[u64]) -> [u8; 32] {
    let mut data = Vec::with_capacity(32 + 16 + sample_blocks.len() * 8);
    data.extend_from_slice(merkle_root);
    data.extend_from_slice(&min_balance.to_le_bytes());
    for block in sample_blocks {
        data.extend_from_slice(&block.to_le_bytes());
    }
    hash(&data)
}

pub(crate) fn decode_root(merkle_root: &str) -> Option<[u8; 32]> {
    hex::decode(merkle_root).ok()?.try_into().ok()
}

/// Watcher's view of a claim against indexed balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAudit {
    pub claim_id: String,
    pub computed_root: String,
    pub commitment_matches: bool,
    pub all_samples_meet_minimum: bool,
    /// Sample blocks where the indexed balance fell below the claimed minimum
    pub shortfall_blocks: Vec<u64>,
    pub samples: Vec<BalanceSample>,
}

impl ClaimAudit {
    /// A challenge is worth staking on
    pub fn recommend_challenge(&self) -> bool {
        !self.commitment_matches || !self.all_samples_meet_minimum
    }
}

pub(crate) fn audit(claim: &Claim, indexer: &dyn BalanceIndexer) -> Result<ClaimAudit> {
    let samples = indexer
        .balances_at(&claim.claimant, &claim.sample_blocks)
        .with_context(|| format!("Failed to fetch balances for claim {}", claim.id))?;

    let tree = SampleTree::build(&samples).context("Failed to commit to indexed samples")?;
    let computed_root = hex::encode(tree.root());

    let shortfall_blocks: Vec<u64> = samples
        .iter()
        .filter(|s| s.balance < claim.min_balance)
        .map(|s| s.block)
        .collect();

    Ok(ClaimAudit {
        claim_id: claim.id.clone(),
        commitment_matches: computed_root.eq_ignore_ascii_case(&claim.merkle_root),
        computed_root,
        all_samples_meet_minimum: shortfall_blocks.is_empty(),
        shortfall_blocks,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_input_hash_binds_every_field() {
        let root = [1u8; 32];
        let base = public_input_hash(&root, 10, &[100, 200]);

        assert_eq!(base, public_input_hash(&root, 10, &[100, 200]));
        assert_ne!(base, public_input_hash(&[2u8; 32], 10, &[100, 200]));
        assert_ne!(base, public_input_hash(&root, 11, &[100, 200]));
        assert_ne!(base, public_input_hash(&root, 10, &[100, 300]));
    }

    #[test]
    fn test_decode_root() {
        assert_eq!(decode_root(&hex::encode([9u8; 32])), Some([9u8; 32]));
        assert_eq!(decode_root("abcd"), None);
        assert_eq!(decode_root("zz"), None);
    }
}
