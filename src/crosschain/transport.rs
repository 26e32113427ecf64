use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

use super::message::{CrossChainSlashMessage, ReceiveAck};
use super::receiver::{ApplyOutcome, ReplicaReceiver};
use crate::external::Clock;

/// One path to a remote replica
#[async_trait]
pub trait SlashTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a message, returning the receiver's delivery id
    async fn send(&self, destination: &str, message: &CrossChainSlashMessage) -> Result<String>;
}

/// Posts messages to a replica's `/crosschain/receive` route
pub struct HttpSlashTransport {
    name: String,
    base_url: String,
    client: Client,
}

impl HttpSlashTransport {
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Chert-Credit/1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SlashTransport for HttpSlashTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, destination: &str, message: &CrossChainSlashMessage) -> Result<String> {
        let url = format!("{}/crosschain/receive", self.base_url);
        debug!(transport = %self.name, destination, url = %url, nonce = message.nonce, "Sending slash message");

        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned HTTP {}", url, response.status());
        }

        let ack: ReceiveAck = response
            .json()
            .await
            .context("Failed to parse receive acknowledgement")?;
        Ok(ack.delivery_id)
    }
}

/// In-process transport straight into a [`ReplicaReceiver`]
///
/// Failures and latency can be injected to exercise retry and failover.
pub struct LoopbackTransport {
    name: String,
    receiver: Arc<ReplicaReceiver>,
    clock: Arc<dyn Clock>,
    fail_next: AtomicU32,
    offline: AtomicBool,
    latency: Option<Duration>,
    sends: AtomicU32,
}

impl LoopbackTransport {
    pub fn new(name: &str, receiver: Arc<ReplicaReceiver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            receiver,
            clock,
            fail_next: AtomicU32::new(0),
            offline: AtomicBool::new(false),
            latency: None,
            sends: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `count` sends
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of send attempts seen, including failed ones
    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlashTransport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, destination: &str, message: &CrossChainSlashMessage) -> Result<String> {
        self.sends.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("{} is offline", self.name);
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            anyhow::bail!("{} dropped the message", self.name);
        }
        if destination != self.receiver.chain_id() {
            anyhow::bail!("{} does not route to {}", self.name, destination);
        }

        let outcome = self.receiver.receive(message, self.clock.now())?;
        let suffix = match outcome {
            ApplyOutcome::Applied { .. } => "applied",
            ApplyOutcome::Duplicate => "duplicate",
        };
        Ok(format!(
            "{}:{}:{}:{}",
            destination, message.source_chain, message.nonce, suffix
        ))
    }
}
