//! Audit trail for risk- and security-relevant engine events
//!
//! Entries are mirrored to `tracing` at the matching level and kept in a
//! bounded in-memory ring for operator queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ClaimSubmitted {
        claim_id: String,
        claimant: String,
    },
    ClaimChallenged {
        claim_id: String,
        challenger: String,
    },
    ClaimFinalized {
        claim_id: String,
        claimant: String,
        upheld: bool,
    },
    SubjectSlashed {
        subject: String,
        severity_bps: u32,
        reason: String,
    },
    SubjectBlacklisted {
        subject: String,
    },
    LiquidationStarted {
        loan_id: String,
        auction_id: String,
    },
    AuctionFilled {
        auction_id: String,
        liquidator: String,
        price: u128,
    },
    CircuitBreakerTripped {
        volume_in_window: u128,
        attempted: u128,
        cap: u128,
    },
    CircuitBreakerResumed {
        operator: String,
    },
    IntakePaused {
        component: String,
        operator: String,
    },
    CrossChainDeliveryFailed {
        destination: String,
        subject: String,
        nonce: u64,
        error: String,
    },
    RemoteSlashApplied {
        source_chain: String,
        subject: String,
        nonce: u64,
    },
    UnauthorizedAttempt {
        actor: String,
        action: String,
    },
    FeedUpdated {
        operator: String,
        feed: String,
        key: String,
    },
}

impl AuditEventType {
    /// Subject or actor the event concerns, if any
    fn subject(&self) -> Option<&str> {
        match self {
            AuditEventType::ClaimSubmitted { claimant, .. } => Some(claimant),
            AuditEventType::ClaimChallenged { challenger, .. } => Some(challenger),
            AuditEventType::ClaimFinalized { claimant, .. } => Some(claimant),
            AuditEventType::SubjectSlashed { subject, .. } => Some(subject),
            AuditEventType::SubjectBlacklisted { subject } => Some(subject),
            AuditEventType::AuctionFilled { liquidator, .. } => Some(liquidator),
            AuditEventType::CircuitBreakerResumed { operator } => Some(operator),
            AuditEventType::IntakePaused { operator, .. } => Some(operator),
            AuditEventType::CrossChainDeliveryFailed { subject, .. } => Some(subject),
            AuditEventType::RemoteSlashApplied { subject, .. } => Some(subject),
            AuditEventType::UnauthorizedAttempt { actor, .. } => Some(actor),
            AuditEventType::FeedUpdated { operator, .. } => Some(operator),
            AuditEventType::LiquidationStarted { .. }
            | AuditEventType::CircuitBreakerTripped { .. } => None,
        }
    }
}

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub metadata: HashMap<String, String>,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, severity: AuditSeverity, at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            timestamp: at,
            event_type,
            severity,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Bounded audit log
pub struct AuditLogger {
    entries: RwLock<VecDeque<AuditEntry>>,
    next_id: AtomicU64,
    max_entries: usize,
    min_severity: AuditSeverity,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            max_entries: 100_000,
            min_severity: AuditSeverity::Info,
        }
    }

    pub fn with_min_severity(mut self, severity: AuditSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_capacity(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn log(&self, mut entry: AuditEntry) {
        if entry.severity < self.min_severity {
            return;
        }

        match entry.severity {
            AuditSeverity::Debug => tracing::debug!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Info => tracing::info!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Warning => tracing::warn!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Error => tracing::error!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Critical => tracing::error!("AUDIT CRITICAL: {:?}", entry.event_type),
        }

        entry.id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Convenience wrapper for the common case
    pub fn record(&self, event_type: AuditEventType, severity: AuditSeverity, at: DateTime<Utc>) {
        self.log(AuditEntry::new(event_type, severity, at));
    }

    pub fn get_recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(count).cloned().collect()
    }

    pub fn get_by_severity(&self, min_severity: AuditSeverity) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.severity >= min_severity)
            .cloned()
            .collect()
    }

    pub fn get_for_subject(&self, subject: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.event_type.subject() == Some(subject))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
