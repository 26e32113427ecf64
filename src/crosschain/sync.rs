use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::message::{CrossChainSlashMessage, SlashAction};
use super::transport::SlashTransport;
use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::capability::{Action, Authorizable};
use crate::config::CrossChainConfig;
use crate::crypto::MessageSigner;
use crate::error::{EngineError, EngineResult};

/// How the two transports of a route are used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Secondary only after the primary fails
    Failover,
    /// Both at once; first success wins
    Redundant,
}

/// A destination replica and its two transports
#[derive(Clone)]
pub struct ReplicaRoute {
    pub chain_id: String,
    pub primary: Arc<dyn SlashTransport>,
    pub secondary: Arc<dyn SlashTransport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub destination: String,
    pub transport: String,
    pub delivery_id: String,
    pub attempts: u32,
}

/// A message that exhausted its retries, parked for operator attention
#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub message: CrossChainSlashMessage,
    pub destination: String,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub message: CrossChainSlashMessage,
    pub delivered: Vec<DeliveryReceipt>,
    pub failed: Vec<FailedDelivery>,
}

impl BroadcastReport {
    pub fn fully_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub delivered: Vec<DeliveryReceipt>,
    pub still_failed: usize,
}

/// Source side of cross-chain propagation
pub struct SlashSynchronizer {
    config: CrossChainConfig,
    signer: MessageSigner,
    routes: Vec<ReplicaRoute>,
    next_nonce: AtomicU64,
    last_sync: DashMap<String, DateTime<Utc>>,
    escalations: Mutex<Vec<FailedDelivery>>,
    authorizer: Arc<dyn Authorizable>,
    audit: Arc<AuditLogger>,
}

impl SlashSynchronizer {
    /// Nonces start at `now` in microseconds so a restart never reuses one
    pub fn new(
        config: CrossChainConfig,
        signer: MessageSigner,
        routes: Vec<ReplicaRoute>,
        authorizer: Arc<dyn Authorizable>,
        audit: Arc<AuditLogger>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            signer,
            routes,
            next_nonce: AtomicU64::new(now.timestamp_micros().max(0) as u64),
            last_sync: DashMap::new(),
            escalations: Mutex::new(Vec::new()),
            authorizer,
            audit,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.chain_id.clone()).collect()
    }

    fn build_message(
        &self,
        subject: &str,
        action: SlashAction,
        severity_bps: u32,
        now: DateTime<Utc>,
    ) -> CrossChainSlashMessage {
        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        CrossChainSlashMessage::new(subject, action, severity_bps, &self.config.chain_id, nonce, now)
            .signed(&self.signer)
    }

    pub async fn propagate_slash(
        &self,
        subject: &str,
        severity_bps: u32,
        now: DateTime<Utc>,
    ) -> BroadcastReport {
        let message = self.build_message(subject, SlashAction::Slash, severity_bps.min(10_000), now);
        self.broadcast(message, now).await
    }

    pub async fn propagate_blacklist(&self, subject: &str, now: DateTime<Utc>) -> BroadcastReport {
        let message = self.build_message(subject, SlashAction::Blacklist, 10_000, now);
        self.broadcast(message, now).await
    }

    /// Mirror a score to every replica, at most once per cooldown per subject
    pub async fn sync_score(
        &self,
        subject: &str,
        score: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<BroadcastReport> {
        match self.last_sync.entry(subject.to_string()) {
            Entry::Occupied(mut last) => {
                let until = *last.get() + self.config.sync_cooldown();
                if now < until {
                    return Err(EngineError::SyncCooldownActive { until });
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }

        let message = self.build_message(subject, SlashAction::ScoreSync { score }, 0, now);
        Ok(self.broadcast(message, now).await)
    }

    /// Fan a signed message out to every replica concurrently
    pub async fn broadcast(&self, message: CrossChainSlashMessage, now: DateTime<Utc>) -> BroadcastReport {
        let deliveries = self
            .routes
            .iter()
            .map(|route| self.deliver(route, &message));
        let results = join_all(deliveries).await;

        let mut report = BroadcastReport {
            message: message.clone(),
            delivered: Vec::new(),
            failed: Vec::new(),
        };
        for (route, result) in self.routes.iter().zip(results) {
            match result {
                Ok(receipt) => report.delivered.push(receipt),
                Err(error) => {
                    let failure = self.escalate(&message, &route.chain_id, error, now);
                    report.failed.push(failure);
                }
            }
        }

        info!(
            subject = %message.subject,
            nonce = message.nonce,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast cross-chain message"
        );
        report
    }

    /// Deliver to one replica with retries and exponential backoff
    pub async fn deliver(
        &self,
        route: &ReplicaRoute,
        message: &CrossChainSlashMessage,
    ) -> EngineResult<DeliveryReceipt> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = match self.config.delivery_mode {
                DeliveryMode::Failover => self.send_failover(route, message).await,
                DeliveryMode::Redundant => self.send_redundant(route, message).await,
            };

            match result {
                Ok((transport, delivery_id)) => {
                    return Ok(DeliveryReceipt {
                        destination: route.chain_id.clone(),
                        transport,
                        delivery_id,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        destination = %route.chain_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Cross-chain delivery attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(EngineError::CrossChainDeliveryFailed {
            destination: route.chain_id.clone(),
            attempts: max_attempts,
            last_error,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .config
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.config.backoff_max_ms);
        Duration::from_millis(ms)
    }

    async fn send_once(
        &self,
        transport: &Arc<dyn SlashTransport>,
        destination: &str,
        message: &CrossChainSlashMessage,
    ) -> Result<(String, String), String> {
        match tokio::time::timeout(
            self.config.transport_timeout(),
            transport.send(destination, message),
        )
        .await
        {
            Ok(Ok(delivery_id)) => Ok((transport.name().to_string(), delivery_id)),
            Ok(Err(e)) => Err(format!("{}: {:#}", transport.name(), e)),
            Err(_) => Err(format!(
                "{}: timed out after {}ms",
                transport.name(),
                self.config.transport_timeout_ms
            )),
        }
    }

    async fn send_failover(
        &self,
        route: &ReplicaRoute,
        message: &CrossChainSlashMessage,
    ) -> Result<(String, String), String> {
        let primary_error = match self.send_once(&route.primary, &route.chain_id, message).await {
            Ok(done) => return Ok(done),
            Err(e) => e,
        };
        debug!(destination = %route.chain_id, error = %primary_error, "Primary transport failed, trying secondary");

        self.send_once(&route.secondary, &route.chain_id, message)
            .await
            .map_err(|secondary_error| format!("{}; {}", primary_error, secondary_error))
    }

    async fn send_redundant(
        &self,
        route: &ReplicaRoute,
        message: &CrossChainSlashMessage,
    ) -> Result<(String, String), String> {
        // The receiver dedups, so both copies landing is harmless
        let (primary, secondary) = tokio::join!(
            self.send_once(&route.primary, &route.chain_id, message),
            self.send_once(&route.secondary, &route.chain_id, message),
        );
        match (primary, secondary) {
            (Ok(done), _) | (Err(_), Ok(done)) => Ok(done),
            (Err(a), Err(b)) => Err(format!("{}; {}", a, b)),
        }
    }

    fn escalate(
        &self,
        message: &CrossChainSlashMessage,
        destination: &str,
        error: EngineError,
        now: DateTime<Utc>,
    ) -> FailedDelivery {
        let (attempts, last_error) = match error {
            EngineError::CrossChainDeliveryFailed { attempts, last_error, .. } => (attempts, last_error),
            other => (0, other.to_string()),
        };

        self.audit.record(
            AuditEventType::CrossChainDeliveryFailed {
                destination: destination.to_string(),
                subject: message.subject.clone(),
                nonce: message.nonce,
                error: last_error.clone(),
            },
            AuditSeverity::Error,
            now,
        );

        let failure = FailedDelivery {
            message: message.clone(),
            destination: destination.to_string(),
            attempts,
            last_error,
            failed_at: now,
        };
        self.escalations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure.clone());
        failure
    }

    /// Deliveries awaiting operator retry
    pub fn failed_deliveries(&self) -> Vec<FailedDelivery> {
        self.escalations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-send every parked delivery with its original nonce
    pub async fn retry_failed(&self, operator: &str, now: DateTime<Utc>) -> EngineResult<RetryReport> {
        if let Err(e) = self.authorizer.authorize(operator, Action::RetryDeliveries) {
            self.audit.record(
                AuditEventType::UnauthorizedAttempt {
                    actor: operator.to_string(),
                    action: Action::RetryDeliveries.as_str().to_string(),
                },
                AuditSeverity::Warning,
                now,
            );
            return Err(e);
        }

        let pending = std::mem::take(&mut *self.escalations.lock().unwrap_or_else(|e| e.into_inner()));
        let mut report = RetryReport {
            delivered: Vec::new(),
            still_failed: 0,
        };

        for failure in pending {
            let Some(route) = self.routes.iter().find(|r| r.chain_id == failure.destination) else {
                warn!(destination = %failure.destination, "No route for parked delivery, dropping");
                continue;
            };
            match self.deliver(route, &failure.message).await {
                Ok(receipt) => report.delivered.push(receipt),
                Err(error) => {
                    self.escalate(&failure.message, &failure.destination, error, now);
                    report.still_failed += 1;
                }
            }
        }

        info!(
            operator,
            delivered = report.delivered.len(),
            still_failed = report.still_failed,
            "Retried failed deliveries"
        );
        Ok(report)
    }
}
