//! Collaborator ports
//!
//! The engine treats the proof verifier, price oracle, block-data indexer,
//! and clock as opaque capabilities. Each port ships an in-process
//! implementation used by the dev server and the tests.

mod clock;
mod indexer;
mod price;
mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use indexer::{BalanceIndexer, BalanceRecorder, InMemoryIndexer};
pub use price::{PriceOracle, PricePublisher, PriceQuote, StaticPriceOracle};
pub use verifier::{AttestedProofVerifier, ProofVerifier};
