//! Key material helpers
//!
//! The symmetric key is the only thing that can open an anchored record.
//! Its SHA-256 hash travels on-chain and into the index so a key can be
//! checked without being revealed.

use chacha20poly1305::aead::OsRng;
use rand::RngCore;
use ring::digest;
use zeroize::Zeroizing;

/// Raw bytes of a generated symmetric key
pub const GENERATED_KEY_BYTES: usize = 32;

/// Generate a random 256-bit symmetric key, hex encoded (64 chars).
pub fn generate_symmetric_key() -> String {
    let mut bytes = Zeroizing::new([0u8; GENERATED_KEY_BYTES]);
    OsRng.fill_bytes(&mut bytes[..]);
    hex::encode(&bytes[..])
}

/// SHA-256 of the key's UTF-8 bytes, lowercase hex.
///
/// Pure function of the key; good for audit and verification only.
pub fn key_hash(key: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, key.as_bytes()))
}

/// Check a key against a previously recorded hash.
pub fn verify_key_hash(key: &str, expected: &str) -> bool {
    key_hash(key).eq_ignore_ascii_case(expected.trim())
}
