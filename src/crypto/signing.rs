use anyhow::{Result, anyhow};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Ed25519 signer for a single chain identity
#[derive(Clone)]
pub struct MessageSigner {
    secret_key: SigningKey,
}

impl MessageSigner {
    /// Generate a fresh key
    pub fn generate() -> Self {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);
        Self {
            secret_key: SigningKey::from_bytes(&secret_bytes),
        }
    }

    /// Load from a hex-encoded 32-byte seed
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| anyhow!("Invalid seed hex: {}", e))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("Signing seed must be 32 bytes"))?;
        Ok(Self {
            secret_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            secret_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.secret_key.sign(data).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// Verify a detached Ed25519 signature
pub fn verify_signature(public_key: &VerifyingKey, data: &[u8], signature: &[u8]) -> bool {
    let signature_bytes: [u8; 64] = match signature.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let sig = Signature::from_bytes(&signature_bytes);
    public_key.verify(data, &sig).is_ok()
}

/// Parse a hex-encoded Ed25519 public key
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| anyhow!("Invalid public key hex: {}", e))?;
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid public key length"))?;
    VerifyingKey::from_bytes(&key_bytes).map_err(|e| anyhow!("Invalid public key: {}", e))
}

/// Hash data using SHA-256
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = MessageSigner::generate();
        let signature = signer.sign(b"slash 0xabc");

        assert!(verify_signature(&signer.verifying_key(), b"slash 0xabc", &signature));
        assert!(!verify_signature(&signer.verifying_key(), b"slash 0xdef", &signature));
    }

    #[test]
    fn test_seed_hex_round_trip() {
        let signer = MessageSigner::from_seed([9u8; 32]);
        let loaded = MessageSigner::from_seed_hex(&hex::encode([9u8; 32])).unwrap();
        assert_eq!(signer.public_key_hex(), loaded.public_key_hex());

        let parsed = parse_public_key(&signer.public_key_hex()).unwrap();
        assert_eq!(parsed, signer.verifying_key());
    }

    #[test]
    fn test_bad_seed_rejected() {
        assert!(MessageSigner::from_seed_hex("abcd").is_err());
        assert!(MessageSigner::from_seed_hex("zz").is_err());
    }
}
