//! LocalPass core — the security engine of a local-only encrypted
//! credential vault.
//!
//! Entries are encrypted individually with XChaCha20-Poly1305 under a key
//! stretched from the master password with Argon2id. Password correctness
//! is proven by decrypting a stored verification token; the password itself
//! is never persisted. [`VaultSession`] is the surface for UI collaborators:
//! it drives setup/unlock/lock, entry CRUD, search, password rotation, and
//! the idle auto-lock timer, persisting through a pluggable [`VaultStore`].

pub mod auth;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod session;
pub mod settings;
pub mod store;

pub use auth::Authenticator;
pub use crypto::EncryptedRecord;
pub use entry::{decode_entry, encode_entry, Entry, EntryDraft, EntryPatch};
pub use error::VaultError;
pub use session::{LockState, VaultSession};
pub use settings::VaultSettings;
pub use store::{FileStore, MemoryStore, StoredRecord, VaultStore};
