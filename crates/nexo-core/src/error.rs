//! Orchestrator error taxonomy
//!
//! Every failure is tagged where it happens. [`AnchorError::kind`] collapses
//! the variants into the handful of reasons an operator acts on.

use nexo_chain::{DecodeError, EnvelopeError, ScriptError};
use nexo_crypto::CipherError;
use nexo_index::IndexError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures talking to the wallet or the explorer
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected service response: {0}")]
    InvalidResponse(String),

    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Operator-facing reason for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFoundLocally,
    UpstreamUnavailable,
    ProtocolMismatch,
    WrongOrCorruptKey,
    InvalidRequest,
    PayloadTooLarge,
    LocalStorage,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFoundLocally => "not_found_locally",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::WrongOrCorruptKey => "wrong_or_corrupt_key",
            Self::InvalidRequest => "invalid_request",
            Self::PayloadTooLarge => "payload_too_large",
            Self::LocalStorage => "local_storage",
            Self::Internal => "internal",
        }
    }

    /// Whether the same call may succeed if simply repeated
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration, lookup and verification failures
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("Invalid request: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Envelope of {len} bytes exceeds the {max} byte data-carrier limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed - wrong key or corrupted ciphertext")]
    Decryption,

    #[error("Decrypted payload is not a valid record: {0}")]
    PayloadFormat(String),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("No index record for case {case_id}")]
    RecordNotFound { case_id: String },

    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable { service: &'static str, reason: String },

    #[error("Local index error: {0}")]
    LocalStorage(#[from] IndexError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnchorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::InvalidRequest,
            Self::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            Self::Encryption(_) | Self::Internal(_) => FailureKind::Internal,
            Self::Decryption | Self::PayloadFormat(_) => FailureKind::WrongOrCorruptKey,
            Self::Envelope(EnvelopeError::ProtocolMismatch { .. }) => FailureKind::ProtocolMismatch,
            Self::Envelope(EnvelopeError::Parse(_)) => FailureKind::Internal,
            Self::Decode(_) => FailureKind::ProtocolMismatch,
            Self::RecordNotFound { .. } => FailureKind::NotFoundLocally,
            Self::UpstreamUnavailable { .. } => FailureKind::UpstreamUnavailable,
            Self::LocalStorage(_) => FailureKind::LocalStorage,
        }
    }

    pub(crate) fn upstream(service: &'static str, reason: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            service,
            reason: reason.to_string(),
        }
    }
}

impl From<CipherError> for AnchorError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Decryption => Self::Decryption,
            CipherError::PayloadFormat(msg) => Self::PayloadFormat(msg),
            CipherError::EmptyKey => Self::Validation(vec!["symmetric key must not be empty".to_string()]),
            other => Self::Encryption(other.to_string()),
        }
    }
}

impl From<ScriptError> for AnchorError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::PayloadTooLarge { len, max } => Self::PayloadTooLarge { len, max },
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            AnchorError::RecordNotFound { case_id: "X".into() }.kind(),
            FailureKind::NotFoundLocally
        );
        assert_eq!(AnchorError::from(CipherError::Decryption).kind(), FailureKind::WrongOrCorruptKey);
        assert_eq!(
            AnchorError::from(DecodeError::EnvelopeNotFound { candidates: 2 }).kind(),
            FailureKind::ProtocolMismatch
        );
        assert_eq!(
            AnchorError::from(ScriptError::PayloadTooLarge { len: 2, max: 1 }).kind(),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(AnchorError::upstream("explorer", "timed out").kind(), FailureKind::UpstreamUnavailable);
        assert!(FailureKind::UpstreamUnavailable.is_retriable());
        assert!(!FailureKind::WrongOrCorruptKey.is_retriable());
    }

    #[test]
    fn test_validation_message_lists_every_problem() {
        let err = AnchorError::Validation(vec!["case id is required".into(), "missing record field `dni`".into()]);
        assert_eq!(
            err.to_string(),
            "Invalid request: case id is required; missing record field `dni`"
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&FailureKind::WrongOrCorruptKey).unwrap(), "\"wrong_or_corrupt_key\"");
        assert_eq!(FailureKind::NotFoundLocally.to_string(), "not_found_locally");
    }
}
