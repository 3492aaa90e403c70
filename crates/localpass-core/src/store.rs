//! Persistence contract and the two bundled store implementations.
//!
//! The engine treats storage as an opaque durable mapping: a flat
//! string-keyed metadata namespace plus a collection of encrypted records
//! keyed by id. `MemoryStore` backs tests and ephemeral use; `FileStore`
//! keeps the whole store as one JSON document and rewrites it after every
//! mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::EncryptedRecord;
use crate::error::VaultError;

/// One encrypted record plus its storage-layer envelope. The envelope
/// timestamps order listings; the authoritative entry timestamps live inside
/// the encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub encrypted_record: EncryptedRecord,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Durable key→value + record storage. Implementations must survive process
/// restarts (or declare themselves ephemeral, like [`MemoryStore`]).
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, VaultError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Insert or replace a record. When `created_at` is `None`, an existing
    /// record keeps its creation time; a new one is stamped now.
    /// `updated_at` is always stamped now.
    async fn put_record(
        &self,
        id: &str,
        record: EncryptedRecord,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<(), VaultError>;

    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>, VaultError>;

    /// All records ordered by `created_at` ascending.
    async fn list_records(&self) -> Result<Vec<StoredRecord>, VaultError>;

    async fn delete_record(&self, id: &str) -> Result<(), VaultError>;

    async fn clear_all(&self) -> Result<(), VaultError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    items: HashMap<String, String>,
    records: HashMap<String, StoredRecord>,
}

impl StoreState {
    fn put_record(
        &mut self,
        id: &str,
        record: EncryptedRecord,
        created_at: Option<DateTime<Utc>>,
    ) {
        let now = crate::entry::now_millis();
        let created_at = created_at
            .or_else(|| self.records.get(id).map(|r| r.created_at))
            .unwrap_or(now);
        self.records.insert(
            id.to_string(),
            StoredRecord {
                id: id.to_string(),
                encrypted_record: record,
                created_at,
                updated_at: now,
            },
        );
    }

    fn list_records(&self) -> Vec<StoredRecord> {
        let mut records: Vec<StoredRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.state.lock().items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.state.lock().items.insert(key.into(), value.into());
        Ok(())
    }

    async fn put_record(
        &self,
        id: &str,
        record: EncryptedRecord,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<(), VaultError> {
        self.state.lock().put_record(id, record, created_at);
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>, VaultError> {
        Ok(self.state.lock().records.get(id).cloned())
    }

    async fn list_records(&self) -> Result<Vec<StoredRecord>, VaultError> {
        Ok(self.state.lock().list_records())
    }

    async fn delete_record(&self, id: &str) -> Result<(), VaultError> {
        self.state.lock().records.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.items.clear();
        state.records.clear();
        Ok(())
    }
}

/// Single-file JSON store. The whole state is loaded at open and rewritten
/// on every mutation; writes go through a temp file + rename so a crash
/// mid-write cannot leave a truncated store behind.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VaultError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let json = fs::read_to_string(&path)
                .map_err(|e| VaultError::Storage(format!("read store: {e}")))?;
            serde_json::from_str(&json)
                .map_err(|e| VaultError::Storage(format!("parse store: {e}")))?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &StoreState) -> Result<(), VaultError> {
        let json = serde_json::to_vec(state)
            .map_err(|e| VaultError::Storage(format!("serialize store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json).map_err(|e| VaultError::Storage(format!("write store: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| VaultError::Storage(format!("commit store: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl VaultStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.state.lock().items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.items.insert(key.into(), value.into());
        self.persist(&state)
    }

    async fn put_record(
        &self,
        id: &str,
        record: EncryptedRecord,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.put_record(id, record, created_at);
        self.persist(&state)
    }

    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>, VaultError> {
        Ok(self.state.lock().records.get(id).cloned())
    }

    async fn list_records(&self) -> Result<Vec<StoredRecord>, VaultError> {
        Ok(self.state.lock().list_records())
    }

    async fn delete_record(&self, id: &str) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.records.remove(id);
        self.persist(&state)
    }

    async fn clear_all(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.items.clear();
        state.records.clear();
        self.persist(&state)
    }
}
