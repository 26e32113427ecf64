use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Oracle price in micro-USD per whole collateral unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: u128,
    pub timestamp: DateTime<Utc>,
}

/// External price feed. Staleness is enforced by the engine, not the feed.
pub trait PriceOracle: Send + Sync {
    fn get_price(&self, asset: &str) -> Option<PriceQuote>;
}

/// Prices pushed by an operator or test harness
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: DashMap<String, PriceQuote>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset: &str, price: u128, timestamp: DateTime<Utc>) {
        self.prices
            .insert(asset.to_string(), PriceQuote { price, timestamp });
    }
}

/// Write side of an operator-driven feed
pub trait PricePublisher: Send + Sync {
    fn publish(&self, asset: &str, price: u128, timestamp: DateTime<Utc>);
}

impl PricePublisher for StaticPriceOracle {
    fn publish(&self, asset: &str, price: u128, timestamp: DateTime<Utc>) {
        self.set_price(asset, price, timestamp);
    }
}

impl PriceOracle for StaticPriceOracle {
    fn get_price(&self, asset: &str) -> Option<PriceQuote> {
        self.prices.get(asset).map(|q| *q)
    }
}
