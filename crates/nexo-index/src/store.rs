//! JSON file backend for the identity index
//!
//! The whole store lives in one JSON file. Every mutation is
//! load-modify-save while holding an exclusive advisory lock on the sidecar
//! `<index>.lock` file, so appends from other instances and other processes
//! are serialized too. Every save replaces the file atomically (temp file in
//! the same directory, then rename), so readers see either the old store or
//! the new one, never half of it.
//!
//! Reads never fail: a missing file is created, and an unreadable or
//! malformed one is replaced in memory by an empty store. Entries that are
//! not readable records are carried through saves untouched.

use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::record::{now_timestamp, IndexRecord, IndexStore, SCHEMA_VERSION};
use crate::{IndexError, RecordIndex, Result};

/// File-backed identity index
pub struct JsonFileIndex {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Held for the duration of one load-modify-save; dropping the file
/// releases the lock.
struct StoreLock {
    _file: File,
}

impl JsonFileIndex {
    /// Use the index file at `path`; nothing is touched until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file carrying the cross-process write lock
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Block until no other writer holds the index.
    fn lock_store(&self) -> Result<StoreLock> {
        fs::create_dir_all(self.dir())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        Ok(StoreLock { _file: file })
    }

    /// Read whatever is on disk, recovering to an empty store.
    fn read_or_empty(&self) -> IndexStore {
        match fs::read_to_string(&self.path) {
            Ok(data) => parse_store(&data),
            Err(e) if e.kind() == ErrorKind::NotFound => IndexStore::empty(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read index file, using an empty store");
                IndexStore::empty()
            }
        }
    }

    /// Read before a save. An existing file that cannot be read is an error
    /// here, since saving an empty store over it would discard its records.
    fn read_for_update(&self) -> Result<IndexStore> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(parse_store(&data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(IndexStore::empty()),
            Err(e) => Err(IndexError::Io(e)),
        }
    }

    fn write_store(&self, store: &IndexStore) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &store.to_document()?)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| IndexError::Persist(e.error))?;
        Ok(())
    }
}

impl RecordIndex for JsonFileIndex {
    fn load(&self) -> IndexStore {
        if self.path.exists() {
            return self.read_or_empty();
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _store_lock = match self.lock_store() {
            Ok(lock) => lock,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not create index file");
                return IndexStore::empty();
            }
        };
        if self.path.exists() {
            return self.read_or_empty();
        }

        let store = IndexStore::empty();
        match self.write_store(&store) {
            Ok(()) => info!(path = %self.path.display(), "created new index file"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not create index file"),
        }
        store
    }

    fn append(&self, record: IndexRecord) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| IndexError::LockPoisoned)?;
        let _store_lock = self.lock_store()?;

        let mut store = self.read_for_update()?;
        let case_id = record.case_id.clone();
        let transaction_id = record.transaction_id.clone();
        store.push(record);
        self.write_store(&store)?;

        info!(
            case_id = %case_id,
            txid = %transaction_id,
            total = store.records.len(),
            "index record saved"
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| IndexError::LockPoisoned)?;
        let _store_lock = self.lock_store()?;
        self.write_store(&IndexStore::empty())?;
        warn!(path = %self.path.display(), "all index records removed");
        Ok(())
    }
}

/// Parse a store file, substituting defaults for anything malformed.
pub(crate) fn parse_store(data: &str) -> IndexStore {
    if data.trim().is_empty() {
        warn!("index file is empty, starting from an empty store");
        return IndexStore::empty();
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "index file is not valid JSON, starting from an empty store");
            return IndexStore::empty();
        }
    };

    let Value::Object(mut fields) = value else {
        warn!("index file is not a JSON object, starting from an empty store");
        return IndexStore::empty();
    };

    let mut records = Vec::new();
    let mut unreadable = Vec::new();
    match fields.remove("records") {
        Some(Value::Array(items)) => {
            for (position, item) in items.into_iter().enumerate() {
                match serde_json::from_value::<IndexRecord>(item.clone()) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(position, error = %e, "index entry is not a readable record, keeping it as is");
                        unreadable.push(item);
                    }
                }
            }
        }
        _ => warn!("index `records` is not an array, resetting it"),
    }

    let text_field = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let store = IndexStore {
        records,
        last_updated: text_field("lastUpdated").unwrap_or_else(now_timestamp),
        version: text_field("version").unwrap_or_else(|| SCHEMA_VERSION.to_string()),
        unreadable,
    };
    debug!(records = store.records.len(), version = %store.version, "index loaded");
    store
}
