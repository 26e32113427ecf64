use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Zero-knowledge proof verification capability.
///
/// Opaque and deterministic: the same `(proof, public_input_hash)` always
/// yields the same answer. The circuit is not defined here.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], public_input_hash: &[u8; 32]) -> bool;
}

/// Development verifier: a proof is an Ed25519 signature by a trusted prover
/// over the public-input hash.
#[derive(Debug, Clone)]
pub struct AttestedProofVerifier {
    prover_keys: Vec<VerifyingKey>,
}

impl AttestedProofVerifier {
    pub fn new(prover_keys: Vec<VerifyingKey>) -> Self {
        Self { prover_keys }
    }
}

impl ProofVerifier for AttestedProofVerifier {
    fn verify(&self, proof: &[u8], public_input_hash: &[u8; 32]) -> bool {
        let signature_bytes: [u8; 64] = match proof.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = Signature::from_bytes(&signature_bytes);

        self.prover_keys
            .iter()
            .any(|key| key.verify(public_input_hash, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn test_attested_proof_round_trip() {
        let prover = SigningKey::from_bytes(&[7u8; 32]);
        let verifier = AttestedProofVerifier::new(vec![prover.verifying_key()]);

        let input = [3u8; 32];
        let proof = prover.sign(&input).to_bytes();

        assert!(verifier.verify(&proof, &input));
        assert!(!verifier.verify(&proof, &[4u8; 32]));
        assert!(!verifier.verify(&proof[..10], &input));
    }
}
