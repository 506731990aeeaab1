//! # Commitment Proofs
//!
//! A validator binds itself to a block height by signing the decimal height
//! string with its RSA commitment key. The 256-byte modulus is registered
//! on-chain by a stake transaction; the public exponent is fixed at 65537,
//! so the modulus bytes alone reconstruct the verification key.

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::CryptoError;

/// Byte length of the commitment key modulus and of every proof.
pub const COMM_KEY_LENGTH: usize = 256;

/// RSA key size matching the 256-byte modulus.
const COMM_KEY_BITS: usize = 2048;

/// Fixed public exponent.
const COMM_PUB_EXPONENT: u64 = 65537;

fn height_digest(height: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(height.to_string().as_bytes());
    hasher.finalize().to_vec()
}

fn left_pad(bytes: &[u8]) -> Result<[u8; COMM_KEY_LENGTH], CryptoError> {
    if bytes.len() > COMM_KEY_LENGTH {
        return Err(CryptoError::InvalidCommitmentKey);
    }
    let mut padded = [0u8; COMM_KEY_LENGTH];
    padded[COMM_KEY_LENGTH - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

/// A validator's commitment keypair.
#[derive(Clone)]
pub struct CommitmentKeyPair {
    private: RsaPrivateKey,
}

impl CommitmentKeyPair {
    /// Generate a fresh 2048-bit commitment keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), COMM_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self { private })
    }

    /// The modulus bytes registered on-chain.
    pub fn modulus_bytes(&self) -> Result<[u8; COMM_KEY_LENGTH], CryptoError> {
        left_pad(&self.private.n().to_bytes_be())
    }

    /// Sign the decimal string of a block height.
    pub fn sign_height(&self, height: u32) -> Result<[u8; COMM_KEY_LENGTH], CryptoError> {
        let proof = self
            .private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &height_digest(height))
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        left_pad(&proof)
    }

    /// The matching verifier.
    pub fn verifier(&self) -> Result<CommitmentVerifier, CryptoError> {
        CommitmentVerifier::from_modulus_bytes(&self.modulus_bytes()?)
    }
}

/// Verifies commitment proofs against a registered modulus.
pub struct CommitmentVerifier {
    public: RsaPublicKey,
}

impl CommitmentVerifier {
    /// Reconstruct the verification key from on-chain modulus bytes.
    pub fn from_modulus_bytes(modulus: &[u8; COMM_KEY_LENGTH]) -> Result<Self, CryptoError> {
        let n = BigUint::from_bytes_be(modulus);
        let e = BigUint::from(COMM_PUB_EXPONENT);
        let public = RsaPublicKey::new(n, e).map_err(|_| CryptoError::InvalidCommitmentKey)?;
        Ok(Self { public })
    }

    /// Check a proof against a block height.
    pub fn verify_height(
        &self,
        height: u32,
        proof: &[u8; COMM_KEY_LENGTH],
    ) -> Result<(), CryptoError> {
        self.public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &height_digest(height), proof)
            .map_err(|_| CryptoError::CommitmentProofInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_height() {
        let keypair = CommitmentKeyPair::generate().unwrap();
        let proof = keypair.sign_height(42).unwrap();
        let verifier = keypair.verifier().unwrap();
        assert!(verifier.verify_height(42, &proof).is_ok());
    }

    #[test]
    fn test_wrong_height_rejected() {
        let keypair = CommitmentKeyPair::generate().unwrap();
        let proof = keypair.sign_height(42).unwrap();
        let verifier = keypair.verifier().unwrap();
        assert_eq!(
            verifier.verify_height(43, &proof),
            Err(CryptoError::CommitmentProofInvalid)
        );
    }

    #[test]
    fn test_foreign_key_rejected() {
        let signer = CommitmentKeyPair::generate().unwrap();
        let other = CommitmentKeyPair::generate().unwrap();
        let proof = signer.sign_height(7).unwrap();
        let verifier = other.verifier().unwrap();
        assert!(verifier.verify_height(7, &proof).is_err());
    }

    #[test]
    fn test_modulus_round_trips_through_bytes() {
        let keypair = CommitmentKeyPair::generate().unwrap();
        let modulus = keypair.modulus_bytes().unwrap();
        let verifier = CommitmentVerifier::from_modulus_bytes(&modulus).unwrap();
        let proof = keypair.sign_height(1).unwrap();
        assert!(verifier.verify_height(1, &proof).is_ok());
    }
}
