use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shape of the Dutch auction's price decay. Both shapes are monotone
/// non-increasing and never go below the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuctionCurve {
    Linear,
    /// Distance to the floor halves every `half_life_secs`
    Exponential { half_life_secs: u64 },
}

impl AuctionCurve {
    pub fn price_at(&self, start: u128, floor: u128, elapsed_secs: i64, duration_secs: i64) -> u128 {
        if start <= floor {
            return floor;
        }
        if elapsed_secs <= 0 {
            return start;
        }
        if elapsed_secs >= duration_secs {
            return floor;
        }

        let span = start - floor;
        let elapsed = elapsed_secs as u128;
        let above_floor = match *self {
            AuctionCurve::Linear => {
                let duration = duration_secs.max(1) as u128;
                span - mul_div(span, elapsed, duration)
            }
            AuctionCurve::Exponential { half_life_secs } => {
                let half_life = half_life_secs.max(1) as u128;
                let halvings = elapsed / half_life;
                if halvings >= 128 {
                    0
                } else {
                    let level = span >> halvings;
                    // Interpolate toward the next halving within the period
                    level - mul_div(level, elapsed % half_life, 2 * half_life)
                }
            }
        };

        floor + above_floor
    }
}

/// `a * b / c` without overflowing for the ranges used here
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    match a.checked_mul(b) {
        Some(product) => product / c,
        None => a / c * b + a % c * b / c,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuctionStatus {
    Open,
    Settled {
        liquidator: String,
        price: u128,
        settled_at: DateTime<Utc>,
    },
}

/// Dutch auction over a loan's entire collateral lot. Prices in micro-USD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationAuction {
    pub id: String,
    pub loan_id: String,
    pub borrower: String,
    pub collateral_asset: String,
    pub collateral_amount: u128,
    pub start_price: u128,
    pub floor_price: u128,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub curve: AuctionCurve,
    pub status: AuctionStatus,
}

impl LiquidationAuction {
    pub fn quote(&self, now: DateTime<Utc>) -> u128 {
        let elapsed = (now - self.start_time).num_seconds();
        self.curve
            .price_at(self.start_price, self.floor_price, elapsed, self.duration_seconds)
    }

    pub fn is_open(&self) -> bool {
        self.status == AuctionStatus::Open
    }
}
