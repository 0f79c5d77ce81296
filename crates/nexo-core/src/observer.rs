//! Observability seam for the orchestrator
//!
//! The orchestrator reports stage transitions and outcomes as
//! [`AnchorEvent`]s to an injected [`Observer`]. Events never carry keys or
//! plaintext.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::FailureKind;

/// Registration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStage {
    Validating,
    Encrypting,
    Encoding,
    Submitting,
    Persisting,
    Done,
    /// On chain, but the local index write failed
    PersistedOnChainOnly,
}

/// Lookup state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStage {
    ResolvingIndex,
    FetchingTransaction,
    Decoding,
    Decrypting,
    Done,
}

/// Events emitted while anchoring or retrieving
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorEvent {
    Registration {
        case_id: String,
        stage: RegistrationStage,
    },
    Lookup {
        case_id: String,
        stage: LookupStage,
    },
    /// Wallet accepted the transaction
    Submitted {
        case_id: String,
        txid: String,
        script_bytes: usize,
    },
    /// The index write after a successful submission failed
    IndexWriteFailed {
        case_id: String,
        txid: String,
        reason: String,
    },
    Verified {
        case_id: String,
        txid: String,
        verified: bool,
    },
    Failed {
        operation: &'static str,
        case_id: String,
        kind: FailureKind,
        reason: String,
    },
}

/// Receiver of orchestrator events
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &AnchorEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &AnchorEvent) {
        match event {
            AnchorEvent::Registration { case_id, stage } => {
                debug!(case_id = %case_id, stage = ?stage, "registration stage");
            }
            AnchorEvent::Lookup { case_id, stage } => {
                debug!(case_id = %case_id, stage = ?stage, "lookup stage");
            }
            AnchorEvent::Submitted {
                case_id,
                txid,
                script_bytes,
            } => {
                info!(case_id = %case_id, txid = %txid, bytes = script_bytes, "accreditation anchored on chain");
            }
            AnchorEvent::IndexWriteFailed { case_id, txid, reason } => {
                warn!(case_id = %case_id, txid = %txid, reason = %reason, "on chain but not indexed locally");
            }
            AnchorEvent::Verified {
                case_id,
                txid,
                verified,
            } => {
                info!(case_id = %case_id, txid = %txid, verified, "verification finished");
            }
            AnchorEvent::Failed {
                operation,
                case_id,
                kind,
                reason,
            } => {
                warn!(operation, case_id = %case_id, kind = %kind, reason = %reason, "operation failed");
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &AnchorEvent) {}
}
