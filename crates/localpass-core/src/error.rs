use thiserror::Error;

/// Fault taxonomy for the vault engine.
///
/// `AuthenticationFailed` and `Decode` are deliberately distinct: a record
/// whose AEAD tag verifies but whose plaintext fails to parse is corrupted
/// data, not a wrong password, and the two are handled differently (unlock
/// skips corrupted records but rejects a bad password outright).
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("vault is locked — unlock with the master password first")]
    VaultLocked,

    #[error("vault is not initialized")]
    NotInitialized,

    #[error("vault is already initialized")]
    AlreadyInitialized,

    #[error("record decode failed: {0}")]
    Decode(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u32),

    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

impl VaultError {
    /// True for faults a caller can recover from by re-prompting the user.
    pub fn is_authentication(&self) -> bool {
        matches!(self, VaultError::AuthenticationFailed)
    }
}
