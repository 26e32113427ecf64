//! Chert Credit Engine
//!
//! Temporal reputation and optimistic-dispute credit: holders prove historical
//! balances through an optimistic claim game, finalized claims feed a
//! decaying and slashable reputation score, and that score prices
//! undercollateralized loans that liquidate through Dutch auctions.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Server entrypoint
//! ├── config.rs       - Configuration and economic constants
//! ├── error.rs        - Error taxonomy, rejections with snapshots
//! ├── audit.rs        - Bounded audit trail
//! ├── capability.rs   - Pausable / Authorizable capabilities
//! ├── coordinator.rs  - Facade wiring every component
//! ├── external/       - Collaborator ports (clock, oracle, indexer, verifier)
//! ├── crypto/         - Ed25519 signing, sample Merkle trees
//! ├── ledger/         - Double-entry stake and credit ledger
//! ├── claims/         - Claim dispute state machine
//! │   ├── types.rs     - Claim, challenge, status
//! │   ├── evidence.rs  - Public input hash, watcher audit
//! │   └── machine.rs   - Transitions and stake settlement
//! ├── reputation/     - Scoring, decay, slashing
//! │   ├── score.rs     - Five-factor scoring engine
//! │   ├── slash.rs     - Severity table and slash events
//! │   ├── tier.rs      - Tier -> LTV / threshold / grace table
//! │   └── store.rs     - Reputation records
//! ├── credit/         - Loans and liquidation
//! │   ├── loan.rs      - Loan and interest accrual
//! │   ├── auction.rs   - Dutch auction curves
//! │   └── engine.rs    - Borrow, repay, health, liquidate, fill
//! ├── risk/           - Hourly volume circuit breaker
//! ├── crosschain/     - Signed slash propagation and replica receiver
//! └── api/            - HTTP API and security middleware
//! ```

pub mod api;
pub mod audit;
pub mod capability;
pub mod claims;
pub mod config;
pub mod coordinator;
pub mod credit;
pub mod crosschain;
pub mod crypto;
pub mod error;
pub mod external;
pub mod ledger;
pub mod reputation;
pub mod risk;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
pub use capability::{Action, Authorizable, OperatorRegistry, Pausable, PauseSwitch};
pub use config::EngineConfig;
pub use coordinator::{
    BlacklistResult, ClaimFinalization, Collaborators, CrossChainWiring, EngineCoordinator,
    LiquidationSettlement, OperatorFeeds,
};
pub use error::{EngineError, EngineResult, ErrorKind, Rejection, StateSnapshot};

pub use claims::{
    BalanceSample, Challenge, Claim, ClaimAudit, ClaimDisputeMachine, ClaimOutcome, ClaimParams,
    ClaimResolution, ClaimStatus,
};
pub use credit::{
    AuctionCurve, AuctionStatus, CreditEngine, DefaultEvent, FillOutcome, HealthReport,
    LiquidationAuction, Loan, LoanStatus, RepayOutcome,
};
pub use crosschain::{
    ApplyOutcome, BroadcastReport, CrossChainSlashMessage, DeliveryMode, HttpSlashTransport,
    LoopbackTransport, ReplicaReceiver, ReplicaRoute, SlashAction, SlashSynchronizer,
    SlashTransport,
};
pub use external::{
    AttestedProofVerifier, BalanceIndexer, BalanceRecorder, Clock, InMemoryIndexer, ManualClock,
    PriceOracle, PricePublisher, PriceQuote, ProofVerifier, StaticPriceOracle, SystemClock,
};
pub use ledger::{AccountKey, AccountKind, StakeLedger, Transfer, TransferType};
pub use reputation::{
    ReputationReader, ReputationRecord, ReputationStore, ReputationTier, ScoreBreakdown,
    ScoringEngine, SlashEvent, SlashReason, SlashSeverity, TierPolicy, TierTable,
};
pub use risk::{CircuitBreakerState, RiskController};
