//! Nexo Index - local registry of anchored identity records
//!
//! Maps case ids, transaction ids and subject ids to what was anchored,
//! including the symmetric key needed to read the on-chain envelope back.

pub mod record;
pub mod store;

pub use record::{now_timestamp, IndexRecord, IndexStats, IndexStore, NewIndexRecord, SCHEMA_VERSION};
pub use store::JsonFileIndex;

/// Index write failures. Reads never fail; they recover to an empty store.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace index file: {0}")]
    Persist(std::io::Error),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Storage seam for the identity index.
///
/// Implementors provide the three primitives; lookups are derived from
/// [`RecordIndex::load`] and all return the first match in insertion order.
pub trait RecordIndex: Send + Sync {
    /// Current store. Never fails.
    fn load(&self) -> IndexStore;

    /// Append one record. Concurrent appends must not lose records.
    fn append(&self, record: IndexRecord) -> Result<()>;

    /// Remove every record.
    fn clear(&self) -> Result<()>;

    fn find_by_transaction_id(&self, transaction_id: &str) -> Option<IndexRecord> {
        self.load().find_by_transaction_id(transaction_id).cloned()
    }

    fn find_by_case_id(&self, case_id: &str) -> Option<IndexRecord> {
        self.load().find_by_case_id(case_id).cloned()
    }

    fn find_by_subject_id(&self, subject_id: &str) -> Vec<IndexRecord> {
        self.load()
            .find_by_subject_id(subject_id)
            .into_iter()
            .cloned()
            .collect()
    }

    fn all_records(&self) -> Vec<IndexRecord> {
        self.load().records
    }

    fn stats(&self) -> IndexStats {
        self.load().stats()
    }

    /// Symmetric key stored for a case, if the case is known
    fn key_for_case(&self, case_id: &str) -> Option<String> {
        self.find_by_case_id(case_id).map(|r| r.symmetric_key)
    }
}
