//! Index entries and the in-memory store

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema version written into every store
pub const SCHEMA_VERSION: &str = "2.0";

/// Current time in the format used throughout the index
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One successful registration.
///
/// The symmetric key is stored in the clear: the index is the authoritative
/// copy and the ledger only ever holds ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "id")]
    pub record_id: String,
    #[serde(rename = "txid")]
    pub transaction_id: String,
    pub timestamp: String,
    #[serde(rename = "expediente")]
    pub case_id: String,
    #[serde(rename = "identityKey", default)]
    pub identity_key: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    #[serde(rename = "encryptionKey")]
    pub symmetric_key: String,
    #[serde(rename = "keyHash")]
    pub key_hash: String,
    #[serde(rename = "dni")]
    pub subject_id: String,
}

/// Field values for [`IndexRecord::new`]
#[derive(Debug, Clone, Default)]
pub struct NewIndexRecord {
    pub record_id: String,
    pub transaction_id: String,
    pub timestamp: String,
    pub case_id: String,
    pub identity_key: String,
    pub issuer: String,
    pub ciphertext: String,
    pub symmetric_key: String,
    pub subject_id: String,
}

impl IndexRecord {
    /// Build a record; the key hash is always computed from the key.
    pub fn new(fields: NewIndexRecord) -> Self {
        let key_hash = nexo_crypto::key_hash(&fields.symmetric_key);
        Self {
            record_id: fields.record_id,
            transaction_id: fields.transaction_id,
            timestamp: fields.timestamp,
            case_id: fields.case_id,
            identity_key: fields.identity_key,
            issuer: fields.issuer,
            ciphertext: fields.ciphertext,
            symmetric_key: fields.symmetric_key,
            key_hash,
            subject_id: fields.subject_id,
        }
    }

    /// Re-check `key_hash == hash(symmetric_key)`; records read from disk
    /// may have been edited by hand.
    pub fn key_hash_matches(&self) -> bool {
        nexo_crypto::verify_key_hash(&self.symmetric_key, &self.key_hash)
    }
}

/// The whole persisted index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStore {
    pub records: Vec<IndexRecord>,
    pub last_updated: String,
    pub version: String,
    /// Entries found on disk that are not readable records. They take no
    /// part in lookups but are written back unchanged on every save.
    #[serde(skip)]
    pub unreadable: Vec<Value>,
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::empty()
    }
}

/// Summary counts over the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total: usize,
    pub unreadable: usize,
    pub by_issuer: BTreeMap<String, usize>,
    pub last_updated: String,
    pub version: String,
}

impl IndexStore {
    /// Empty store at the current schema version
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            last_updated: now_timestamp(),
            version: SCHEMA_VERSION.to_string(),
            unreadable: Vec::new(),
        }
    }

    pub fn push(&mut self, record: IndexRecord) {
        self.records.push(record);
        self.last_updated = now_timestamp();
    }

    /// First record with this transaction id
    pub fn find_by_transaction_id(&self, transaction_id: &str) -> Option<&IndexRecord> {
        self.records.iter().find(|r| r.transaction_id == transaction_id)
    }

    /// First record with this case id; later duplicates are ignored
    pub fn find_by_case_id(&self, case_id: &str) -> Option<&IndexRecord> {
        self.records.iter().find(|r| r.case_id == case_id)
    }

    pub fn find_by_subject_id(&self, subject_id: &str) -> Vec<&IndexRecord> {
        self.records.iter().filter(|r| r.subject_id == subject_id).collect()
    }

    /// On-disk form: unreadable entries first, in their original order,
    /// then the typed records.
    pub fn to_document(&self) -> serde_json::Result<Value> {
        let mut document = serde_json::to_value(self)?;
        if !self.unreadable.is_empty() {
            if let Some(Value::Array(records)) = document.get_mut("records") {
                records.splice(0..0, self.unreadable.iter().cloned());
            }
        }
        Ok(document)
    }

    pub fn stats(&self) -> IndexStats {
        let mut by_issuer = BTreeMap::new();
        for record in &self.records {
            *by_issuer.entry(record.issuer.clone()).or_insert(0) += 1;
        }
        IndexStats {
            total: self.records.len(),
            unreadable: self.unreadable.len(),
            by_issuer,
            last_updated: self.last_updated.clone(),
            version: self.version.clone(),
        }
    }
}
