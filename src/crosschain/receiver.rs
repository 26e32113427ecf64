use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::message::{CrossChainSlashMessage, SlashAction};
use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::error::{EngineError, EngineResult};
use crate::reputation::{ReputationStore, SlashReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { subject: String, score: u32 },
    /// Already applied; no state change
    Duplicate,
}

/// Destination side: verifies and applies messages from trusted source chains
pub struct ReplicaReceiver {
    chain_id: String,
    store: Arc<ReputationStore>,
    trusted_sources: HashMap<String, VerifyingKey>,
    applied: DashMap<(String, String, u64), DateTime<Utc>>,
    audit: Arc<AuditLogger>,
}

impl ReplicaReceiver {
    pub fn new(
        chain_id: &str,
        store: Arc<ReputationStore>,
        trusted_sources: HashMap<String, VerifyingKey>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            store,
            trusted_sources,
            applied: DashMap::new(),
            audit,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Apply a message at most once. Duplicates are absorbed.
    pub fn receive(&self, message: &CrossChainSlashMessage, now: DateTime<Utc>) -> EngineResult<ApplyOutcome> {
        match self.apply_once(message, now) {
            Err(e) if e.is_absorbed() => {
                debug!(
                    source = %message.source_chain,
                    subject = %message.subject,
                    nonce = message.nonce,
                    "Duplicate delivery absorbed"
                );
                Ok(ApplyOutcome::Duplicate)
            }
            other => other,
        }
    }

    fn apply_once(&self, message: &CrossChainSlashMessage, now: DateTime<Utc>) -> EngineResult<ApplyOutcome> {
        if message.source_chain == self.chain_id {
            return Err(EngineError::InvalidMessage(
                "message originates from this chain".to_string(),
            ));
        }
        let key = self.trusted_sources.get(&message.source_chain).ok_or_else(|| {
            EngineError::InvalidMessage(format!("untrusted source chain {}", message.source_chain))
        })?;
        if !message.verify(key) {
            return Err(EngineError::InvalidMessage("signature does not verify".to_string()));
        }
        if message.severity_bps > 10_000 {
            return Err(EngineError::InvalidMessage("severity above 10000 bps".to_string()));
        }

        // The vacant entry stays locked until the store update lands, so
        // concurrent deliveries of the same key serialize here
        let slot = match self.applied.entry(message.dedup_key()) {
            Entry::Occupied(_) => {
                return Err(EngineError::DuplicateDelivery {
                    subject: message.subject.clone(),
                    nonce: message.nonce,
                });
            }
            Entry::Vacant(slot) => slot,
        };

        let reason = SlashReason::Remote {
            source_chain: message.source_chain.clone(),
            nonce: message.nonce,
        };
        match message.action {
            SlashAction::Slash => {
                self.store
                    .slash_bps(&message.subject, message.severity_bps, reason, now);
            }
            SlashAction::Blacklist => {
                self.store.blacklist(&message.subject, reason, now);
            }
            SlashAction::ScoreSync { score } => {
                self.store
                    .apply_remote_score(&message.subject, &message.source_chain, score, now);
            }
        }
        slot.insert(now);

        let score = self.store.snapshot(&message.subject, now).score;
        info!(
            source = %message.source_chain,
            subject = %message.subject,
            nonce = message.nonce,
            action = ?message.action,
            score,
            "Applied cross-chain message"
        );
        if !matches!(message.action, SlashAction::ScoreSync { .. }) {
            self.audit.record(
                AuditEventType::RemoteSlashApplied {
                    source_chain: message.source_chain.clone(),
                    subject: message.subject.clone(),
                    nonce: message.nonce,
                },
                AuditSeverity::Warning,
                now,
            );
        }

        Ok(ApplyOutcome::Applied {
            subject: message.subject.clone(),
            score,
        })
    }
}
