//! Nexo Chain - on-chain envelope codec
//!
//! This crate provides:
//! - The JSON protocol envelope wrapping ciphertext plus metadata
//! - `OP_FALSE OP_RETURN` data-carrier script building
//! - Payload recovery from explorer transactions across every push encoding
//!
//! Everything here is pure; nothing touches the network or the disk.

pub mod decoder;
pub mod envelope;
pub mod script;
pub mod transaction;

pub use decoder::extract_envelope;
pub use envelope::{unwrap, wrap, Envelope, EnvelopeMetadata, PROTOCOL_TAG};
pub use script::{build_data_carrier_script, decode_data_carrier_script, MAX_DATA_CARRIER_PAYLOAD};
pub use transaction::{ScriptPubKey, Transaction, TransactionOutput};

/// Envelope-level failures
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Parse(String),

    #[error("Not an ONCE-Identity envelope (protocol: {})", .found.as_deref().unwrap_or("none"))]
    ProtocolMismatch { found: Option<String> },
}

/// Script-level failures
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Payload of {len} bytes exceeds the {max} byte data-carrier limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Script is not a data-carrier script")]
    NotDataCarrier,

    #[error("Script truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported push opcode 0x{0:02x}")]
    UnsupportedPushOpcode(u8),

    #[error("Script is not valid hex")]
    InvalidHex,
}

/// Transaction-level decode failures
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Transaction has no outputs")]
    NoOutputs,

    #[error("No ONCE-Identity envelope found ({candidates} data-carrier outputs scanned)")]
    EnvelopeNotFound { candidates: usize },
}
