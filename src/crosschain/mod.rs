//! Cross-chain slash synchronization
//!
//! ```text
//!  SlashSynchronizer ──primary──►┐
//!   (sign, retry,    ──secondary─┤──► ReplicaReceiver ──► ReputationStore
//!    escalate)                   │    (verify, dedup by
//!                                │     source/subject/nonce)
//! ```
//!
//! Delivery is at-least-once over two independent transports; application is
//! exactly-once at each replica. Nothing here holds a store lock across a
//! transport call.

mod message;
mod receiver;
mod sync;
mod transport;

pub use message::{CrossChainSlashMessage, ReceiveAck, SlashAction};
pub use receiver::{ApplyOutcome, ReplicaReceiver};
pub use sync::{
    BroadcastReport, DeliveryMode, DeliveryReceipt, FailedDelivery, ReplicaRoute, RetryReport,
    SlashSynchronizer,
};
pub use transport::{HttpSlashTransport, LoopbackTransport, SlashTransport};
