use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use crate::credit::AuctionCurve;
use crate::crosschain::DeliveryMode;
use crate::reputation::{ScoreWeights, SlashSeverityTable, TierTable};

/// Wei per ETH
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// USD amounts are carried in micro-dollars
pub const USD: u128 = 1_000_000;

/// Collateral amounts are carried in 18-decimal base units
pub const COLLATERAL_UNIT: u128 = 1_000_000_000_000_000_000;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub claims: ClaimsConfig,
    pub reputation: ReputationConfig,
    pub credit: CreditConfig,
    pub risk: RiskConfig,
    pub crosschain: CrossChainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Require an API key on write routes
    pub enable_auth: bool,
    /// Accepted API keys
    pub api_keys: Vec<String>,
    /// Identities allowed to resume the breaker, pause intake, or blacklist
    pub operators: Vec<String>,
    /// Replica endpoints must be HTTPS
    pub require_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Mask secrets before they reach the log
    pub sanitize_logs: bool,
    /// Emit span open/close events
    pub log_requests: bool,
}

/// Optimistic claim and dispute parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// USER_STAKE in wei
    pub user_stake: u128,
    /// Challenger stake as a multiple of USER_STAKE
    pub challenger_stake_multiplier: u32,
    /// MIN_SAMPLE_BLOCK_GAP
    pub min_sample_block_gap: u64,
    pub min_samples: usize,
    pub max_samples: usize,
    /// OPTIMISM_WINDOW in seconds
    pub optimism_window_secs: i64,
    /// Time a claimant has to answer a challenge with a proof
    pub resolution_window_secs: i64,
    /// Share of a forfeited challenger stake paid to the claimant (rest to reward pool)
    pub claimant_reward_bps: u32,
    /// Share of a forfeited claimant stake paid to the challenger (rest to reward pool)
    pub challenger_reward_bps: u32,
}

impl ClaimsConfig {
    pub fn challenger_stake(&self) -> u128 {
        self.user_stake
            .saturating_mul(self.challenger_stake_multiplier as u128)
    }

    pub fn optimism_window(&self) -> Duration {
        Duration::seconds(self.optimism_window_secs)
    }

    pub fn resolution_window(&self) -> Duration {
        Duration::seconds(self.resolution_window_secs)
    }
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            user_stake: WEI_PER_ETH / 10,
            challenger_stake_multiplier: 2,
            min_sample_block_gap: 100,
            min_samples: 2,
            max_samples: 512,
            optimism_window_secs: 7 * 24 * 3600,
            resolution_window_secs: 3 * 24 * 3600,
            claimant_reward_bps: 5_000,
            challenger_reward_bps: 5_000,
        }
    }
}

/// Scoring, decay, and slashing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// DECAY_PERIOD in days
    pub decay_period_days: i64,
    pub weights: ScoreWeights,
    pub severity: SlashSeverityTable,
    pub tiers: TierTable,
    /// Blocks covering one year of holdings, for the duration component
    pub blocks_per_year: u64,
}

impl ReputationConfig {
    pub fn decay_period(&self) -> Duration {
        Duration::days(self.decay_period_days)
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            decay_period_days: 730,
            weights: ScoreWeights::default(),
            severity: SlashSeverityTable::default(),
            tiers: TierTable::default(),
            blocks_per_year: 2_628_000,
        }
    }
}

/// Loan pricing and liquidation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditConfig {
    /// PRICE_STALENESS_BOUND in seconds
    pub price_staleness_secs: i64,
    /// Auction start price premium over fair value
    pub auction_premium_bps: u32,
    /// Maximum auction discount below fair value (sets the floor)
    pub auction_max_discount_bps: u32,
    pub auction_duration_secs: i64,
    pub auction_curve: AuctionCurve,
}

impl CreditConfig {
    pub fn price_staleness(&self) -> Duration {
        Duration::seconds(self.price_staleness_secs)
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            price_staleness_secs: 3600,
            auction_premium_bps: 500,
            auction_max_discount_bps: 2_000,
            auction_duration_secs: 6 * 3600,
            auction_curve: AuctionCurve::Linear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// MAX_HOURLY_VOLUME in micro-USD
    pub max_hourly_volume: u128,
    pub window_secs: i64,
}

impl RiskConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_hourly_volume: 10_000_000 * USD,
            window_secs: 3600,
        }
    }
}

/// A remote replica of the reputation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaEndpoint {
    pub chain_id: String,
    pub primary_url: String,
    pub secondary_url: String,
}

/// A source chain whose slash messages this replica accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedSource {
    pub chain_id: String,
    pub public_key_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainConfig {
    /// This deployment's chain identifier
    pub chain_id: String,
    /// TRANSPORT_TIMEOUT in milliseconds
    pub transport_timeout_ms: u64,
    /// MAX_RETRIES
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub delivery_mode: DeliveryMode,
    /// Minimum spacing between score syncs for one subject
    pub sync_cooldown_secs: i64,
    pub replicas: Vec<ReplicaEndpoint>,
    pub trusted_sources: Vec<TrustedSource>,
    /// Hex Ed25519 seed for signing outbound messages (loaded from env)
    pub signing_seed_hex: String,
}

impl CrossChainConfig {
    pub fn transport_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn sync_cooldown(&self) -> Duration {
        Duration::seconds(self.sync_cooldown_secs)
    }
}

impl Default for CrossChainConfig {
    fn default() -> Self {
        Self {
            chain_id: "ethereum".to_string(),
            transport_timeout_ms: 30_000,
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            delivery_mode: DeliveryMode::Failover,
            sync_cooldown_secs: 3600,
            replicas: Vec::new(),
            trusted_sources: Vec::new(),
            signing_seed_hex: String::new(), // Must be set via environment
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8780,
            },
            security: SecurityConfig {
                enable_auth: true,
                api_keys: Vec::new(),
                operators: Vec::new(),
                require_https: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
            claims: ClaimsConfig::default(),
            reputation: ReputationConfig::default(),
            credit: CreditConfig::default(),
            risk: RiskConfig::default(),
            crosschain: CrossChainConfig::default(),
        }
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {} value", name))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl EngineConfig {
    /// Load configuration from environment variables over the documented defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = env::var("CHERT_CREDIT_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env("CHERT_CREDIT_PORT")? {
            config.server.port = port;
        }

        // Security
        if let Some(enable_auth) = parse_env("CHERT_CREDIT_ENABLE_AUTH")? {
            config.security.enable_auth = enable_auth;
        }
        if let Ok(keys) = env::var("CHERT_CREDIT_API_KEYS") {
            config.security.api_keys = split_list(&keys);
        }
        if let Ok(operators) = env::var("CHERT_CREDIT_OPERATORS") {
            config.security.operators = split_list(&operators);
        }
        if let Some(require_https) = parse_env("CHERT_CREDIT_REQUIRE_HTTPS")? {
            config.security.require_https = require_https;
        }

        // Logging
        if let Ok(level) = env::var("CHERT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(sanitize) = parse_env("CHERT_SANITIZE_LOGS")? {
            config.logging.sanitize_logs = sanitize;
        }
        if let Some(log_requests) = parse_env("CHERT_LOG_REQUESTS")? {
            config.logging.log_requests = log_requests;
        }

        // Claims
        if let Some(stake) = parse_env("CHERT_CREDIT_USER_STAKE_WEI")? {
            config.claims.user_stake = stake;
        }
        if let Some(gap) = parse_env("CHERT_CREDIT_MIN_SAMPLE_BLOCK_GAP")? {
            config.claims.min_sample_block_gap = gap;
        }
        if let Some(window) = parse_env("CHERT_CREDIT_OPTIMISM_WINDOW_SECS")? {
            config.claims.optimism_window_secs = window;
        }
        if let Some(window) = parse_env("CHERT_CREDIT_RESOLUTION_WINDOW_SECS")? {
            config.claims.resolution_window_secs = window;
        }

        // Reputation
        if let Some(days) = parse_env("CHERT_CREDIT_DECAY_PERIOD_DAYS")? {
            config.reputation.decay_period_days = days;
        }

        // Credit
        if let Some(secs) = parse_env("CHERT_CREDIT_PRICE_STALENESS_SECS")? {
            config.credit.price_staleness_secs = secs;
        }
        if let Some(secs) = parse_env("CHERT_CREDIT_AUCTION_DURATION_SECS")? {
            config.credit.auction_duration_secs = secs;
        }
        if let Ok(curve) = env::var("CHERT_CREDIT_AUCTION_CURVE") {
            config.credit.auction_curve = match curve.to_lowercase().as_str() {
                "linear" => AuctionCurve::Linear,
                "exponential" => AuctionCurve::Exponential {
                    half_life_secs: parse_env::<u64>("CHERT_CREDIT_AUCTION_HALF_LIFE_SECS")?
                        .unwrap_or(3600),
                },
                other => anyhow::bail!("Invalid CHERT_CREDIT_AUCTION_CURVE value: {}", other),
            };
        }

        // Risk
        if let Some(cap) = parse_env::<u128>("CHERT_CREDIT_MAX_HOURLY_VOLUME_USD")? {
            config.risk.max_hourly_volume = cap
                .checked_mul(USD)
                .context("CHERT_CREDIT_MAX_HOURLY_VOLUME_USD overflows")?;
        }

        // Cross-chain
        if let Ok(chain_id) = env::var("CHERT_CREDIT_CHAIN_ID") {
            config.crosschain.chain_id = chain_id;
        }
        if let Some(ms) = parse_env("CHERT_CREDIT_TRANSPORT_TIMEOUT_MS")? {
            config.crosschain.transport_timeout_ms = ms;
        }
        if let Some(retries) = parse_env("CHERT_CREDIT_MAX_RETRIES")? {
            config.crosschain.max_retries = retries;
        }
        if let Ok(mode) = env::var("CHERT_CREDIT_DELIVERY_MODE") {
            config.crosschain.delivery_mode = match mode.to_lowercase().as_str() {
                "failover" => DeliveryMode::Failover,
                "redundant" => DeliveryMode::Redundant,
                other => anyhow::bail!("Invalid CHERT_CREDIT_DELIVERY_MODE value: {}", other),
            };
        }
        config.crosschain.replicas = Self::load_replicas()?;
        config.crosschain.trusted_sources = Self::load_trusted_sources()?;

        config.crosschain.signing_seed_hex = env::var("CHERT_CREDIT_SIGNING_SEED")
            .unwrap_or_else(|_| {
                warn!("CHERT_CREDIT_SIGNING_SEED not set, generating an ephemeral signing key");
                String::new()
            });

        config.validate()?;

        Ok(config)
    }

    /// Replicas are listed as `chain=primary_url|secondary_url`, comma-separated
    fn load_replicas() -> Result<Vec<ReplicaEndpoint>> {
        let raw = match env::var("CHERT_CREDIT_REPLICAS") {
            Ok(raw) => raw,
            Err(_) => return Ok(Vec::new()),
        };

        let mut replicas = Vec::new();
        for entry in split_list(&raw) {
            let (chain_id, urls) = entry
                .split_once('=')
                .with_context(|| format!("Replica entry missing '=': {}", entry))?;
            let (primary_url, secondary_url) = urls
                .split_once('|')
                .with_context(|| format!("Replica entry missing secondary URL: {}", entry))?;

            replicas.push(ReplicaEndpoint {
                chain_id: chain_id.trim().to_string(),
                primary_url: primary_url.trim().to_string(),
                secondary_url: secondary_url.trim().to_string(),
            });
            info!("Configured replica: {}", chain_id.trim());
        }

        Ok(replicas)
    }

    /// Trusted sources are listed as `chain=public_key_hex`, comma-separated
    fn load_trusted_sources() -> Result<Vec<TrustedSource>> {
        let raw = match env::var("CHERT_CREDIT_TRUSTED_SOURCES") {
            Ok(raw) => raw,
            Err(_) => return Ok(Vec::new()),
        };

        split_list(&raw)
            .into_iter()
            .map(|entry| {
                let (chain_id, key) = entry
                    .split_once('=')
                    .with_context(|| format!("Trusted source entry missing '=': {}", entry))?;
                Ok(TrustedSource {
                    chain_id: chain_id.trim().to_string(),
                    public_key_hex: key.trim().to_string(),
                })
            })
            .collect()
    }

    /// Validate configuration for economic and security consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.claims.user_stake == 0 {
            anyhow::bail!("USER_STAKE must be non-zero");
        }
        if self.claims.challenger_stake() <= self.claims.user_stake {
            anyhow::bail!("Challenger stake must strictly exceed USER_STAKE");
        }
        if self.claims.min_sample_block_gap == 0 {
            anyhow::bail!("MIN_SAMPLE_BLOCK_GAP must be non-zero");
        }
        if self.claims.min_samples == 0 || self.claims.min_samples > self.claims.max_samples {
            anyhow::bail!("Sample count bounds are inconsistent");
        }
        if self.claims.optimism_window_secs <= 0 || self.claims.resolution_window_secs <= 0 {
            anyhow::bail!("Claim windows must be positive");
        }
        if self.claims.claimant_reward_bps > 10_000 || self.claims.challenger_reward_bps > 10_000 {
            anyhow::bail!("Reward shares cannot exceed 10000 bps");
        }

        if self.reputation.decay_period_days <= 0 {
            anyhow::bail!("DECAY_PERIOD must be positive");
        }
        if self.reputation.weights.total() != 100 {
            anyhow::bail!(
                "Score weights must sum to 100, got {}",
                self.reputation.weights.total()
            );
        }
        self.reputation
            .tiers
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid tier table: {}", e))?;
        self.reputation
            .severity
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid slash severity table: {}", e))?;

        if self.credit.price_staleness_secs <= 0 {
            anyhow::bail!("PRICE_STALENESS_BOUND must be positive");
        }
        if self.credit.auction_duration_secs <= 0 {
            anyhow::bail!("Auction duration must be positive");
        }
        if self.credit.auction_max_discount_bps >= 10_000 {
            anyhow::bail!("Auction discount must be below 10000 bps");
        }

        if self.risk.max_hourly_volume == 0 || self.risk.window_secs <= 0 {
            anyhow::bail!("Risk window and volume cap must be positive");
        }

        if self.crosschain.chain_id.is_empty() {
            anyhow::bail!("Chain id cannot be empty");
        }
        if self.crosschain.transport_timeout_ms == 0 {
            anyhow::bail!("TRANSPORT_TIMEOUT must be non-zero");
        }
        if self.security.require_https {
            for replica in &self.crosschain.replicas {
                for url in [&replica.primary_url, &replica.secondary_url] {
                    if !url.starts_with("https://") {
                        anyhow::bail!(
                            "HTTPS is required but replica {} endpoint is not HTTPS: {}",
                            replica.chain_id,
                            url
                        );
                    }
                }
            }
        }

        if self.security.enable_auth && self.security.api_keys.is_empty() {
            warn!("Authentication enabled but no API keys configured - write routes will reject");
        }

        Ok(())
    }
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    let sensitive_patterns = ["key", "token", "secret", "seed", "password", "credential"];

    let data_lower = data.to_lowercase();
    for pattern in &sensitive_patterns {
        if data_lower.contains(pattern) {
            if data.len() > 20 {
                return format!("{}***{}", &data[..6], &data[data.len().saturating_sub(6)..]);
            } else {
                return format!(
                    "{}***{}",
                    &data[..data.len().min(2)],
                    &data[data.len().saturating_sub(2)..]
                );
            }
        }
    }

    data.to_string()
}

/// Mask an opaque secret regardless of content
pub fn mask_secret(secret: &str) -> String {
    if secret.len() <= 8 {
        return "***".to_string();
    }
    format!("{}***{}", &secret[..4], &secret[secret.len() - 4..])
}
