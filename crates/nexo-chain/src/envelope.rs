//! Protocol envelope embedded on-chain
//!
//! The envelope is the public artifact: ciphertext plus enough metadata to
//! find and check it. The JSON key names match the format already anchored
//! by earlier deployments, so old envelopes still parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EnvelopeError;

/// Discriminator carried by every envelope of this protocol
pub const PROTOCOL_TAG: &str = "ONCE-Identity";

/// Version written by [`wrap`]
pub const ENVELOPE_VERSION: &str = "3.0-encrypted";

/// Issuer used when none is supplied
pub const DEFAULT_ISSUER: &str = "ONCE";

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

/// An anchored envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    #[serde(rename = "protocol")]
    pub protocol_tag: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    pub timestamp: String,
    #[serde(rename = "expediente")]
    pub case_id: String,
    #[serde(rename = "identityKey", default)]
    pub identity_key: String,
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    #[serde(rename = "keyHash")]
    pub key_hash: String,
    #[serde(rename = "algorithm")]
    pub algorithm_tag: String,
}

/// Everything in an envelope except the ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub version: String,
    pub protocol: String,
    pub issuer: String,
    pub timestamp: String,
    pub case_id: String,
    pub identity_key: String,
    pub key_hash: String,
    pub algorithm: String,
}

impl EnvelopeMetadata {
    /// Metadata for a fresh envelope; version, protocol and algorithm are
    /// filled with the current constants.
    pub fn new(
        issuer: impl Into<String>,
        timestamp: impl Into<String>,
        case_id: impl Into<String>,
        identity_key: impl Into<String>,
        key_hash: impl Into<String>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            protocol: PROTOCOL_TAG.to_string(),
            issuer: issuer.into(),
            timestamp: timestamp.into(),
            case_id: case_id.into(),
            identity_key: identity_key.into(),
            key_hash: key_hash.into(),
            algorithm: nexo_crypto::ALGORITHM.to_string(),
        }
    }
}

impl Envelope {
    /// Assemble an envelope; the protocol tag is always [`PROTOCOL_TAG`].
    pub fn new(ciphertext: impl Into<String>, metadata: &EnvelopeMetadata) -> Self {
        Self {
            version: metadata.version.clone(),
            protocol_tag: PROTOCOL_TAG.to_string(),
            issuer: metadata.issuer.clone(),
            timestamp: metadata.timestamp.clone(),
            case_id: metadata.case_id.clone(),
            identity_key: metadata.identity_key.clone(),
            ciphertext: ciphertext.into(),
            key_hash: metadata.key_hash.clone(),
            algorithm_tag: metadata.algorithm.clone(),
        }
    }

    pub fn metadata(&self) -> EnvelopeMetadata {
        EnvelopeMetadata {
            version: self.version.clone(),
            protocol: self.protocol_tag.clone(),
            issuer: self.issuer.clone(),
            timestamp: self.timestamp.clone(),
            case_id: self.case_id.clone(),
            identity_key: self.identity_key.clone(),
            key_hash: self.key_hash.clone(),
            algorithm: self.algorithm_tag.clone(),
        }
    }

    /// Serialize to compact JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Parse(e.to_string()))
    }
}

/// Wrap ciphertext and metadata into embeddable bytes.
pub fn wrap(ciphertext: &str, metadata: &EnvelopeMetadata) -> Result<Vec<u8>, EnvelopeError> {
    Envelope::new(ciphertext, metadata).to_bytes()
}

/// Parse embedded bytes back into an envelope.
///
/// [`EnvelopeError::ProtocolMismatch`] means "valid JSON object, not ours";
/// [`EnvelopeError::Parse`] means the bytes are malformed or an envelope of
/// our protocol is missing required fields.
pub fn unwrap(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Parse(e.to_string()))?;

    let fields = value
        .as_object()
        .ok_or_else(|| EnvelopeError::Parse("envelope is not a JSON object".to_string()))?;

    match fields.get("protocol") {
        Some(Value::String(tag)) if tag == PROTOCOL_TAG => {}
        Some(Value::String(tag)) => {
            return Err(EnvelopeError::ProtocolMismatch {
                found: Some(tag.clone()),
            })
        }
        Some(other) => {
            return Err(EnvelopeError::ProtocolMismatch {
                found: Some(other.to_string()),
            })
        }
        None => return Err(EnvelopeError::ProtocolMismatch { found: None }),
    }

    serde_json::from_value(value).map_err(|e| EnvelopeError::Parse(e.to_string()))
}
