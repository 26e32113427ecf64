use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::claims::BalanceSample;
use crate::crypto::signing::hash;

/// Inclusion proof for one sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleProof {
    pub leaf_hash: [u8; 32],
    pub siblings: Vec<[u8; 32]>,
    pub sibling_on_right: Vec<bool>,
}

/// Merkle tree over ordered `(block, balance)` samples.
///
/// Odd levels duplicate their last node.
#[derive(Debug, Clone)]
pub struct SampleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl SampleTree {
    pub fn leaf_hash(sample: &BalanceSample) -> [u8; 32] {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&sample.block.to_le_bytes());
        data.extend_from_slice(&sample.balance.to_le_bytes());
        hash(&data)
    }

    pub fn build(samples: &[BalanceSample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(anyhow!("Cannot commit to an empty sample set"));
        }

        let mut levels = vec![samples.iter().map(Self::leaf_hash).collect::<Vec<_>>()];

        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<[u8; 32]> = current
                .chunks(2)
                .map(|chunk| {
                    let right = if chunk.len() == 2 { chunk[1] } else { chunk[0] };
                    hash(&[chunk[0], right].concat())
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn generate_proof(&self, index: usize) -> Result<SampleProof> {
        if index >= self.levels[0].len() {
            return Err(anyhow!("Sample index out of bounds"));
        }

        let mut siblings = Vec::new();
        let mut sibling_on_right = Vec::new();
        let mut current = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let is_left = current % 2 == 0;
            let sibling_index = if is_left { current + 1 } else { current - 1 };
            let sibling = level.get(sibling_index).copied().unwrap_or(level[current]);
            siblings.push(sibling);
            sibling_on_right.push(is_left);
            current /= 2;
        }

        Ok(SampleProof {
            leaf_hash: self.levels[0][index],
            siblings,
            sibling_on_right,
        })
    }

    pub fn verify_proof(proof: &SampleProof, root: &[u8; 32]) -> bool {
        if proof.siblings.len() != proof.sibling_on_right.len() {
            return false;
        }

        let mut current = proof.leaf_hash;
        for (sibling, on_right) in proof.siblings.iter().zip(&proof.sibling_on_right) {
            current = if *on_right {
                hash(&[current, *sibling].concat())
            } else {
                hash(&[*sibling, current].concat())
            };
        }

        &current == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: u64) -> Vec<BalanceSample> {
        (0..n)
            .map(|i| BalanceSample {
                block: 1_000 + i * 100,
                balance: 10 + i as u128,
            })
            .collect()
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let forward = samples(5);
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = SampleTree::build(&forward).unwrap().root();
        let b = SampleTree::build(&reversed).unwrap().root();
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in [1u64, 2, 5, 8, 13] {
            let tree = SampleTree::build(&samples(n)).unwrap();
            let root = tree.root();
            for i in 0..n as usize {
                let proof = tree.generate_proof(i).unwrap();
                assert!(SampleTree::verify_proof(&proof, &root), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = SampleTree::build(&samples(6)).unwrap();
        let mut proof = tree.generate_proof(2).unwrap();
        proof.leaf_hash[0] ^= 0xff;
        assert!(!SampleTree::verify_proof(&proof, &tree.root()));
    }

    #[test]
    fn test_empty_samples_rejected() {
        assert!(SampleTree::build(&[]).is_err());
    }
}
