//! Signing, verification, and canonical hashing used by the snapshot protocol.
//!
//! The node treats signing and verification as an interface (the "Crypto
//! collaborator" of the core spec); this crate provides a concrete Ed25519
//! implementation of it and the [`MultiSignature`] aggregation type.

pub mod multisig;
pub mod sign;

pub use multisig::MultiSignature;
pub use sign::{sign_bytes, verify_bytes, SigningKey, VerificationKeyBytes};
