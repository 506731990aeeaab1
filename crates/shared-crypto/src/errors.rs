//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from signature and commitment operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Bytes did not form a valid Ed25519 public key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature did not verify against the key and message.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Commitment key modulus bytes were rejected.
    #[error("invalid commitment key")]
    InvalidCommitmentKey,

    /// Commitment proof did not verify against the registered key.
    #[error("commitment proof verification failed")]
    CommitmentProofInvalid,

    /// RSA key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}
