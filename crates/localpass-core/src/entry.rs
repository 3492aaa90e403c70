//! Credential entry model and the plaintext codec.
//!
//! Payload wire format is camelCase JSON with millisecond timestamps,
//! matching the record layout already present in deployed vaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultError;

/// One decrypted credential. Exists in memory only while the vault is
/// unlocked. `id` and `created_at` are immutable for the life of the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// User-supplied fields for a new entry.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub notes: String,
    pub tags: Vec<String>,
}

impl EntryDraft {
    /// Rejects drafts before any cryptographic or storage work happens.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.password.is_empty() {
            return Err(VaultError::Validation("entry password is required".into()));
        }
        Ok(())
    }

    pub(crate) fn into_entry(self, now: DateTime<Utc>) -> Entry {
        Entry {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            url: self.url,
            username: self.username,
            password: self.password,
            notes: self.notes,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an existing entry. `None` fields are left untouched;
/// `id` and `created_at` can never be patched.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl EntryPatch {
    pub(crate) fn apply(self, entry: &mut Entry, now: DateTime<Utc>) -> Result<(), VaultError> {
        if let Some(password) = &self.password {
            if password.is_empty() {
                return Err(VaultError::Validation("entry password is required".into()));
            }
        }
        if let Some(title) = self.title {
            entry.title = title;
        }
        if let Some(url) = self.url {
            entry.url = url;
        }
        if let Some(username) = self.username {
            entry.username = username;
        }
        if let Some(password) = self.password {
            entry.password = password;
        }
        if let Some(notes) = self.notes {
            entry.notes = notes;
        }
        if let Some(tags) = self.tags {
            entry.tags = tags;
        }
        entry.updated_at = now;
        Ok(())
    }
}

/// Current time truncated to millisecond precision, the resolution the wire
/// format keeps. Stamping entries at this resolution makes a persisted
/// entry round-trip byte-equal to its in-memory original.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Canonical plaintext bytes for the cipher engine.
pub fn encode_entry(entry: &Entry) -> Result<Vec<u8>, VaultError> {
    serde_json::to_vec(entry).map_err(|e| VaultError::Decode(e.to_string()))
}

/// Inverse of [`encode_entry`]. Failure here is a corrupted-payload fault,
/// distinct from a wrong-password authentication failure.
pub fn decode_entry(bytes: &[u8]) -> Result<Entry, VaultError> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::Decode(e.to_string()))
}
