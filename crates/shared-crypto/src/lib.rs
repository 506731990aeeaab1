//! # Shared Crypto
//!
//! Cryptographic primitives for the miner core.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA3-256 | Canonical tx/block hashes, sortition |
//! | `signatures` | Ed25519 | Account and root-key signatures |
//! | `commitment` | RSA PKCS#1 v1.5 | Height commitment proofs for sortition |
//!
//! ## Security Properties
//!
//! - **Ed25519**: deterministic nonces, no RNG dependency at signing time
//! - **RSA commitments**: 2048-bit keys, fixed public exponent 65537; the
//!   modulus bytes are what gets registered on-chain by a stake transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commitment;
pub mod errors;
pub mod hashing;
pub mod signatures;

pub use commitment::{CommitmentKeyPair, CommitmentVerifier};
pub use errors::CryptoError;
pub use hashing::sha3_256;
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
