use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use silica_credit::{
    AttestedProofVerifier, Collaborators, CrossChainWiring, EngineConfig, EngineCoordinator,
    InMemoryIndexer, OperatorFeeds, StaticPriceOracle, SystemClock,
    api::{SecurityMiddlewareConfig, create_router},
    config::{mask_secret, sanitize_for_logging},
    crypto::parse_public_key,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first; it validates economic and security settings
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check CHERT_CREDIT_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting Chert credit engine");
    info!(
        "Security settings: HTTPS required: {}, Auth enabled: {}",
        config.security.require_https, config.security.enable_auth
    );

    let wiring = CrossChainWiring::from_config(&config)?;
    info!(
        chain_id = %config.crosschain.chain_id,
        public_key = %wiring.signer.public_key_hex(),
        replicas = wiring.routes.len(),
        trusted_sources = wiring.trusted_sources.len(),
        mode = ?config.crosschain.delivery_mode,
        "Cross-chain synchronizer configured"
    );

    // Prices, balance history and pool liquidity arrive through the operator routes
    let oracle = Arc::new(StaticPriceOracle::new());
    let indexer = Arc::new(InMemoryIndexer::new());
    let collaborators = Collaborators {
        clock: Arc::new(SystemClock),
        verifier: Arc::new(AttestedProofVerifier::new(load_prover_keys()?)),
        oracle: oracle.clone(),
        indexer: indexer.clone(),
    };
    let engine = Arc::new(
        EngineCoordinator::new(&config, collaborators, wiring).with_operator_feeds(OperatorFeeds {
            prices: oracle,
            balances: indexer,
        }),
    );
    if config.security.operators.is_empty() {
        warn!("No operators configured; feed, pool and breaker routes will reject every call");
    }

    let app = create_router(
        engine,
        SecurityMiddlewareConfig::from_engine_config(&config),
    )
    .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Credit engine listening on {}", bind_addr);
    for key in &config.security.api_keys {
        let shown = if config.logging.sanitize_logs {
            mask_secret(key)
        } else {
            key.clone()
        };
        info!(api_key = %shown, "API key loaded");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_logging(config: &EngineConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with data sanitization enabled");
    }
    Ok(())
}

/// Trusted prover keys for the attested verifier, comma-separated hex
fn load_prover_keys() -> Result<Vec<ed25519_dalek::VerifyingKey>> {
    let raw = match std::env::var("CHERT_CREDIT_PROVER_KEYS") {
        Ok(raw) => raw,
        Err(_) => {
            warn!("CHERT_CREDIT_PROVER_KEYS not set - every dispute proof will be rejected");
            return Ok(Vec::new());
        }
    };

    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| {
            parse_public_key(k)
                .with_context(|| format!("Invalid prover key {}", sanitize_for_logging(k)))
        })
        .collect()
}
