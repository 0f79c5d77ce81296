//! Envelope recovery from explorer transactions
//!
//! Walks the outputs in order, picks data-carrier candidates, decodes the
//! push and tries the envelope codec on each. Outputs belonging to other
//! protocols and malformed candidates are skipped; the first envelope of our
//! protocol wins.

use tracing::{debug, warn};

use crate::envelope::{self, Envelope};
use crate::script;
use crate::transaction::Transaction;
use crate::{DecodeError, EnvelopeError};

/// Decode a hex-encoded data-carrier script into its payload bytes.
pub fn decode_script_hex(script_hex: &str) -> Result<Vec<u8>, crate::ScriptError> {
    let bytes = hex::decode(script_hex.trim()).map_err(|_| crate::ScriptError::InvalidHex)?;
    script::decode_data_carrier_script(&bytes).map(<[u8]>::to_vec)
}

/// Find this protocol's envelope in a transaction.
pub fn extract_envelope(tx: &Transaction) -> Result<Envelope, DecodeError> {
    if tx.outputs.is_empty() {
        return Err(DecodeError::NoOutputs);
    }

    let mut candidates = 0usize;

    for (index, output) in tx.outputs.iter().enumerate() {
        if !output.is_data_carrier_candidate() {
            continue;
        }
        candidates += 1;

        let payload = match decode_script_hex(&output.script_pub_key.hex) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(txid = %tx.txid, output = index, error = %e, "skipping undecodable data-carrier output");
                continue;
            }
        };

        let text = match std::str::from_utf8(&payload) {
            Ok(text) => text,
            Err(_) => {
                debug!(txid = %tx.txid, output = index, bytes = payload.len(), "data-carrier payload is not UTF-8");
                continue;
            }
        };

        match envelope::unwrap(text.as_bytes()) {
            Ok(envelope) => {
                debug!(txid = %tx.txid, output = index, case_id = %envelope.case_id, "envelope found");
                return Ok(envelope);
            }
            Err(EnvelopeError::ProtocolMismatch { found }) => {
                debug!(txid = %tx.txid, output = index, protocol = ?found, "data-carrier output belongs to another protocol");
            }
            Err(EnvelopeError::Parse(reason)) => {
                warn!(txid = %tx.txid, output = index, %reason, "malformed data-carrier payload");
            }
        }
    }

    Err(DecodeError::EnvelopeNotFound { candidates })
}
