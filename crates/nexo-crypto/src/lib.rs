//! Nexo Crypto - record encryption layer
//!
//! This crate provides:
//! - ChaCha20-Poly1305 encryption of accreditation records
//! - PBKDF2 key derivation from the symmetric key string
//! - Key hashing for non-secret verification
//! - Random symmetric key generation

pub mod cipher;
pub mod keys;
pub mod record;

pub use cipher::{decrypt, encrypt, ALGORITHM};
pub use keys::{generate_symmetric_key, key_hash, verify_key_hash};
pub use record::PersonalRecord;

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Symmetric key must not be empty")]
    EmptyKey,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed - wrong key or corrupted ciphertext")]
    Decryption,

    #[error("Decrypted payload is not a valid record: {0}")]
    PayloadFormat(String),

    #[error("Record serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CipherError>;
