//! Cryptographic utilities
//!
//! - Ed25519 signing of cross-chain slash messages and proof attestations
//! - SHA-256 Merkle commitments over balance samples

pub mod merkle;
pub mod signing;

pub use merkle::{SampleProof, SampleTree};
pub use signing::{MessageSigner, hash, parse_public_key, verify_signature};
