//! Explorer transaction model
//!
//! Mirrors the WhatsOnChain `tx` response: a list of outputs, each with the
//! locking script in hex and the explorer's own classification.

use serde::{Deserialize, Serialize};

use crate::script;

/// Explorer classification for data-only outputs
pub const NULL_DATA_TYPE: &str = "nulldata";

/// A transaction as returned by the explorer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub txid: String,
    #[serde(rename = "vout", default)]
    pub outputs: Vec<TransactionOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asm: Option<String>,
    #[serde(default)]
    pub hex: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
}

impl Transaction {
    pub fn new(txid: impl Into<String>, outputs: Vec<TransactionOutput>) -> Self {
        Self {
            txid: txid.into(),
            outputs,
        }
    }
}

impl TransactionOutput {
    /// Output carrying only a raw script, as some providers return it.
    pub fn from_script(n: u32, script: &[u8]) -> Self {
        Self {
            value: None,
            n,
            script_pub_key: ScriptPubKey {
                asm: None,
                hex: hex::encode(script),
                script_type: None,
            },
        }
    }

    pub fn with_script_type(mut self, script_type: impl Into<String>) -> Self {
        self.script_pub_key.script_type = Some(script_type.into());
        self
    }

    pub fn with_asm(mut self, asm: impl Into<String>) -> Self {
        self.script_pub_key.asm = Some(asm.into());
        self
    }

    /// Whether this output may carry an embedded payload.
    ///
    /// Either the explorer says so (`nulldata`), or the opcode mnemonics
    /// begin with the false/return pair, or the raw script bytes do.
    pub fn is_data_carrier_candidate(&self) -> bool {
        let spk = &self.script_pub_key;

        if spk
            .script_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(NULL_DATA_TYPE))
        {
            return true;
        }

        if let Some(asm) = spk.asm.as_deref() {
            let asm = asm.trim_start();
            if asm.starts_with("OP_FALSE OP_RETURN") || asm.starts_with("0 OP_RETURN") {
                return true;
            }
        }

        let marker = [script::OP_FALSE, script::OP_RETURN];
        spk.hex
            .get(..4)
            .and_then(|prefix| hex::decode(prefix).ok())
            .is_some_and(|prefix| prefix == marker)
    }
}
