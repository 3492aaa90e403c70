//! Master-password verification and rotation.
//!
//! Password correctness is proven by decrypting a stored verification
//! token — an encrypted known constant. The password itself is never
//! persisted; the stored SHA-256 fingerprint exists only as an out-of-band
//! sanity check and never gates unlock, so the two checks cannot disagree.

use std::sync::Arc;

use crate::crypto::{self, EncryptedRecord};
use crate::entry::{encode_entry, Entry};
use crate::error::VaultError;
use crate::store::VaultStore;

pub const KEY_VAULT_INITIALIZED: &str = "vaultInitialized";
pub const KEY_VAULT_TEST: &str = "vaultTest";
pub const KEY_MASTER_PASSWORD_HASH: &str = "masterPasswordHash";

/// Plaintext of the verification token.
const VAULT_TEST_VALUE: &[u8] = b"vault-test";

/// Minimum master password length, enforced before any key stretching.
pub const MIN_MASTER_PASSWORD_LEN: usize = 8;

/// Broker for the vault's metadata state machine: Uninitialized → Initialized.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn VaultStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    pub async fn is_initialized(&self) -> Result<bool, VaultError> {
        Ok(self
            .store
            .get_item(KEY_VAULT_INITIALIZED)
            .await?
            .as_deref()
            == Some("true"))
    }

    /// First-run setup. Fails with `AlreadyInitialized` (touching nothing)
    /// when a vault exists, and only otherwise on storage failure.
    pub async fn initialize(&self, password: &str) -> Result<(), VaultError> {
        validate_master_password(password)?;
        if self.is_initialized().await? {
            return Err(VaultError::AlreadyInitialized);
        }
        let token = crypto::encrypt(VAULT_TEST_VALUE, password)?;
        self.persist_token(&token, password).await?;
        self.store.set_item(KEY_VAULT_INITIALIZED, "true").await?;
        Ok(())
    }

    /// The sole unlock gate: success iff the verification token decrypts
    /// under `password`. Every failure mode reports the same generic
    /// authentication error.
    pub async fn verify(&self, password: &str) -> Result<(), VaultError> {
        let token = self.load_token().await?;
        crypto::decrypt(&token, password)
            .map_err(|_| VaultError::AuthenticationFailed)?;
        Ok(())
    }

    /// Re-encrypt the verification token and every entry under
    /// `new_password`, as a staged commit: all ciphertexts are produced in
    /// memory before the first write, entry records are persisted next, and
    /// the token is swapped last. A crypto failure therefore aborts with the
    /// vault untouched; only a storage fault mid-persist can leave a mixed
    /// state, and that is reported as a failure.
    pub async fn rotate(
        &self,
        entries: &[Entry],
        old_password: &str,
        new_password: &str,
    ) -> Result<(), VaultError> {
        validate_master_password(new_password)?;
        self.verify(old_password).await?;

        let new_token = crypto::encrypt(VAULT_TEST_VALUE, new_password)?;
        let mut staged: Vec<(&Entry, EncryptedRecord)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let plaintext = encode_entry(entry)?;
            staged.push((entry, crypto::encrypt(&plaintext, new_password)?));
        }

        for (entry, record) in staged {
            self.store
                .put_record(&entry.id, record, Some(entry.created_at))
                .await?;
        }
        self.persist_token(&new_token, new_password).await?;
        Ok(())
    }

    async fn load_token(&self) -> Result<EncryptedRecord, VaultError> {
        let json = self
            .store
            .get_item(KEY_VAULT_TEST)
            .await?
            .ok_or(VaultError::NotInitialized)?;
        serde_json::from_str(&json).map_err(|e| VaultError::Decode(e.to_string()))
    }

    async fn persist_token(
        &self,
        token: &EncryptedRecord,
        password: &str,
    ) -> Result<(), VaultError> {
        let json =
            serde_json::to_string(token).map_err(|e| VaultError::Storage(e.to_string()))?;
        self.store.set_item(KEY_VAULT_TEST, &json).await?;
        self.store
            .set_item(KEY_MASTER_PASSWORD_HASH, &crypto::fingerprint(password))
            .await?;
        Ok(())
    }
}

pub(crate) fn validate_master_password(password: &str) -> Result<(), VaultError> {
    if password.len() < MIN_MASTER_PASSWORD_LEN {
        return Err(VaultError::Validation(format!(
            "master password must be at least {MIN_MASTER_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn authenticator() -> Authenticator {
        Authenticator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn initialize_then_verify() {
        let auth = authenticator();
        assert!(!auth.is_initialized().await.unwrap());
        auth.initialize("correct horse").await.unwrap();
        assert!(auth.is_initialized().await.unwrap());
        auth.verify("correct horse").await.unwrap();
        let err = auth.verify("wrong password").await.unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn verify_before_initialize_fails() {
        let auth = authenticator();
        let err = auth.verify("whatever1").await.unwrap_err();
        assert!(matches!(err, VaultError::NotInitialized));
    }

    #[tokio::test]
    async fn second_initialize_rejected_and_data_untouched() {
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(store.clone());
        auth.initialize("first password").await.unwrap();
        let token_before = store.get_item(KEY_VAULT_TEST).await.unwrap();

        let err = auth.initialize("second password").await.unwrap_err();
        assert!(matches!(err, VaultError::AlreadyInitialized));
        assert_eq!(store.get_item(KEY_VAULT_TEST).await.unwrap(), token_before);
        auth.verify("first password").await.unwrap();
    }

    #[tokio::test]
    async fn short_password_rejected_before_init() {
        let auth = authenticator();
        let err = auth.initialize("short").await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(!auth.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn rotate_swaps_the_gate() {
        let auth = authenticator();
        auth.initialize("old password").await.unwrap();
        auth.rotate(&[], "old password", "new password").await.unwrap();
        auth.verify("new password").await.unwrap();
        let err = auth.verify("old password").await.unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn rotate_requires_old_password() {
        let auth = authenticator();
        auth.initialize("old password").await.unwrap();
        let err = auth
            .rotate(&[], "not the password", "new password")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
        auth.verify("old password").await.unwrap();
    }

    #[tokio::test]
    async fn fingerprint_stored_but_never_gates() {
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(store.clone());
        auth.initialize("correct horse").await.unwrap();
        // Corrupt the fingerprint; unlock must be unaffected.
        store
            .set_item(KEY_MASTER_PASSWORD_HASH, "garbage")
            .await
            .unwrap();
        auth.verify("correct horse").await.unwrap();
    }
}
