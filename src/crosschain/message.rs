use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{MessageSigner, verify_signature};

const DOMAIN_TAG: &[u8] = b"chert-credit/slash/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlashAction {
    /// Remove `severity_bps` of the subject's score
    Slash,
    Blacklist,
    /// Mirror the subject's score on the source chain
    ScoreSync { score: u32 },
}

impl SlashAction {
    fn tag(&self) -> u8 {
        match self {
            SlashAction::Slash => 1,
            SlashAction::Blacklist => 2,
            SlashAction::ScoreSync { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainSlashMessage {
    pub subject: String,
    pub action: SlashAction,
    pub severity_bps: u32,
    pub source_chain: String,
    pub nonce: u64,
    pub issued_at: DateTime<Utc>,
    /// Hex Ed25519 signature by the source chain's key
    #[serde(default)]
    pub signature: String,
}

impl CrossChainSlashMessage {
    pub fn new(
        subject: &str,
        action: SlashAction,
        severity_bps: u32,
        source_chain: &str,
        nonce: u64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            action,
            severity_bps,
            source_chain: source_chain.to_string(),
            nonce,
            issued_at,
            signature: String::new(),
        }
    }

    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(DOMAIN_TAG.len() + self.subject.len() + 64);
        data.extend_from_slice(DOMAIN_TAG);
        for field in [self.source_chain.as_bytes(), self.subject.as_bytes()] {
            data.extend_from_slice(&(field.len() as u32).to_le_bytes());
            data.extend_from_slice(field);
        }
        data.push(self.action.tag());
        if let SlashAction::ScoreSync { score } = self.action {
            data.extend_from_slice(&score.to_le_bytes());
        }
        data.extend_from_slice(&self.severity_bps.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(&self.issued_at.timestamp_micros().to_le_bytes());
        data
    }

    pub fn signed(mut self, signer: &MessageSigner) -> Self {
        self.signature = hex::encode(signer.sign(&self.signing_bytes()));
        self
    }

    pub fn verify(&self, key: &VerifyingKey) -> bool {
        match hex::decode(&self.signature) {
            Ok(signature) => verify_signature(key, &self.signing_bytes(), &signature),
            Err(_) => false,
        }
    }

    /// Replica-side deduplication key
    pub fn dedup_key(&self) -> (String, String, u64) {
        (self.source_chain.clone(), self.subject.clone(), self.nonce)
    }
}

/// Receiver's acknowledgement, returned to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveAck {
    pub delivery_id: String,
    pub duplicate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> CrossChainSlashMessage {
        CrossChainSlashMessage::new("0xa", SlashAction::Slash, 2_000, "ethereum", 7, Utc::now())
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = MessageSigner::from_seed([1u8; 32]);
        let msg = message().signed(&signer);
        assert!(msg.verify(&signer.verifying_key()));

        let other = MessageSigner::from_seed([2u8; 32]);
        assert!(!msg.verify(&other.verifying_key()));
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let signer = MessageSigner::from_seed([1u8; 32]);
        let msg = message().signed(&signer);

        let mut bumped = msg.clone();
        bumped.severity_bps = 10_000;
        assert!(!bumped.verify(&signer.verifying_key()));

        let mut retargeted = msg.clone();
        retargeted.subject = "0xb".into();
        assert!(!retargeted.verify(&signer.verifying_key()));

        let mut unsigned = msg;
        unsigned.signature = "zz".into();
        assert!(!unsigned.verify(&signer.verifying_key()));
    }

    #[test]
    fn test_json_shape() {
        let msg = CrossChainSlashMessage::new(
            "0xa",
            SlashAction::ScoreSync { score: 640 },
            0,
            "ethereum",
            1,
            Utc::now(),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["action"]["type"], "score_sync");
        assert_eq!(json["action"]["score"], 640);
    }
}
