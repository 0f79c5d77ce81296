//! ChaCha20-Poly1305 record encryption
//!
//! Accreditation records are sealed before they leave the machine. The
//! symmetric key is a free-form string (usually 64 hex chars from
//! [`generate_symmetric_key`](crate::keys::generate_symmetric_key)), so a
//! 256-bit cipher key is derived from it with PBKDF2-HMAC-SHA256 and a
//! per-message salt.
//!
//! Ciphertext layout, base64 encoded:
//! `salt (16) || nonce (12) || ciphertext || tag (16)`

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use ring::pbkdf2;
use std::num::NonZeroU32;
use zeroize::Zeroizing;

use crate::record::PersonalRecord;
use crate::{CipherError, Result};

/// Algorithm tag written next to the ciphertext in every envelope
pub const ALGORITHM: &str = "CHACHA20-POLY1305/PBKDF2-SHA256";

/// 256-bit derived key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 128-bit PBKDF2 salt (16 bytes)
pub const SALT_SIZE: usize = 16;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;
/// Poly1305 tag (16 bytes)
pub const TAG_SIZE: usize = 16;

const PBKDF2_ITERATIONS: u32 = 100_000;

fn derive_key(key: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut derived = Zeroizing::new([0u8; KEY_SIZE]);
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        key.as_bytes(),
        &mut derived[..],
    );
    derived
}

/// Seal raw bytes under `key`.
///
/// Every call draws a fresh salt and nonce, so sealing the same input twice
/// never produces the same output.
pub fn seal(plaintext: &[u8], key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CipherError::EmptyKey);
    }

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let derived = derive_key(key, &salt);
    let cipher = ChaCha20Poly1305::new_from_slice(&derived[..])
        .map_err(|_| CipherError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CipherError::Encryption)?;

    let mut sealed = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(sealed))
}

/// Open a string produced by [`seal`].
///
/// Wrong key, bad base64, truncation and tampering all surface as
/// [`CipherError::Decryption`]; nothing is returned unless the tag verifies.
pub fn open(ciphertext: &str, key: &str) -> Result<Zeroizing<Vec<u8>>> {
    if key.is_empty() {
        return Err(CipherError::EmptyKey);
    }

    let sealed = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| CipherError::Decryption)?;
    if sealed.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::Decryption);
    }

    let (salt, rest) = sealed.split_at(SALT_SIZE);
    let (nonce_bytes, encrypted) = rest.split_at(NONCE_SIZE);

    let derived = derive_key(key, salt);
    let cipher = ChaCha20Poly1305::new_from_slice(&derived[..])
        .map_err(|_| CipherError::Decryption)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
        .map_err(|_| CipherError::Decryption)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a record: canonical JSON, then [`seal`].
pub fn encrypt(record: &PersonalRecord, key: &str) -> Result<String> {
    let canonical = Zeroizing::new(record.to_canonical_bytes()?);
    seal(canonical.as_slice(), key)
}

/// Decrypt a record produced by [`encrypt`].
///
/// A payload that authenticates but is not a JSON object fails with
/// [`CipherError::PayloadFormat`] rather than [`CipherError::Decryption`].
pub fn decrypt(ciphertext: &str, key: &str) -> Result<PersonalRecord> {
    let plaintext = open(ciphertext, key)?;
    serde_json::from_slice(plaintext.as_slice()).map_err(|e| CipherError::PayloadFormat(e.to_string()))
}
