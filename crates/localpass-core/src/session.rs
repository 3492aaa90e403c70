//! Vault session manager: the lock/unlock state machine, the in-memory
//! decrypted entry set, and the idle / clipboard timers.
//!
//! `VaultSession` is a cloneable handle over shared state. Mutating
//! operations take the write lock for their whole duration, so at most one
//! mutation is in flight per vault instance; reads (`search_entries`,
//! observers) take the read lock. The master password lives in memory only
//! while unlocked, inside a `Zeroizing` wrapper, and is dropped (zeroized)
//! on every transition to `Locked`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{validate_master_password, Authenticator};
use crate::crypto;
use crate::entry::{decode_entry, encode_entry, now_millis, Entry, EntryDraft, EntryPatch};
use crate::error::VaultError;
use crate::settings::{
    VaultSettings, KEY_AUTO_LOCK_TIMEOUT, KEY_CLIPBOARD_CLEAR_TIME, KEY_DARK_MODE, KEY_LOCALE,
};
use crate::store::VaultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

struct SessionInner {
    state: LockState,
    master_password: Option<Zeroizing<String>>,
    entries: Vec<Entry>,
    settings: VaultSettings,
    loading: bool,
    idle_timer: Option<JoinHandle<()>>,
    clipboard_timer: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// Wipe everything session-scoped. Dropping the `Zeroizing` wrapper
    /// zeroizes the password bytes; aborting the timers prevents post-lock
    /// side effects.
    fn clear(&mut self) {
        self.state = LockState::Locked;
        self.master_password = None;
        self.entries.clear();
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.clipboard_timer.take() {
            handle.abort();
        }
    }

    fn require_unlocked(&self) -> Result<&str, VaultError> {
        match (&self.state, &self.master_password) {
            (LockState::Unlocked, Some(password)) => Ok(password.as_str()),
            _ => Err(VaultError::VaultLocked),
        }
    }

    fn sort_entries(&mut self) {
        // Most recently touched first: a user-facing contract, not incidental.
        self.entries
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
    }
}

/// Cloneable handle to one vault session. All clones share state.
#[derive(Clone)]
pub struct VaultSession {
    store: Arc<dyn VaultStore>,
    auth: Authenticator,
    inner: Arc<RwLock<SessionInner>>,
}

impl VaultSession {
    /// Open a session against `store`, loading persisted preferences.
    /// The session starts `Locked` with an empty entry set.
    pub async fn open(store: Arc<dyn VaultStore>) -> Result<Self, VaultError> {
        let settings = VaultSettings::load(&store).await?;
        let auth = Authenticator::new(store.clone());
        Ok(Self {
            store,
            auth,
            inner: Arc::new(RwLock::new(SessionInner {
                state: LockState::Locked,
                master_password: None,
                entries: Vec::new(),
                settings,
                loading: false,
                idle_timer: None,
                clipboard_timer: None,
            })),
        })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    // ── Lock state machine ──────────────────────────────────────────────

    /// First-run setup. Initializes the vault metadata and transitions to
    /// `Unlocked` with an empty entry set. Fails without touching anything
    /// if the vault already exists.
    pub async fn setup(&self, password: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        self.auth.initialize(password).await?;
        inner.state = LockState::Unlocked;
        inner.master_password = Some(Zeroizing::new(password.to_owned()));
        inner.entries.clear();
        self.arm_idle_timer(&mut inner);
        debug!("vault initialized and unlocked");
        Ok(())
    }

    /// Verify the password, decrypt every persisted record, and transition
    /// to `Unlocked`. Individual records that fail to decrypt or decode are
    /// skipped with a warning — one corrupted record must not block the
    /// rest of the vault. No-op when already unlocked.
    pub async fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        if inner.state == LockState::Unlocked {
            return Ok(());
        }
        inner.loading = true;
        let result = self.unlock_locked(&mut inner, password).await;
        inner.loading = false;
        if result.is_err() {
            inner.clear();
        }
        result
    }

    async fn unlock_locked(
        &self,
        inner: &mut SessionInner,
        password: &str,
    ) -> Result<(), VaultError> {
        self.auth.verify(password).await?;

        let records = self.store.list_records().await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let plaintext = match crypto::decrypt(&record.encrypted_record, password) {
                Ok(plaintext) => plaintext,
                Err(err) => {
                    warn!(id = %record.id, %err, "skipping undecryptable record");
                    continue;
                }
            };
            match decode_entry(&plaintext) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(id = %record.id, %err, "skipping undecodable record");
                }
            }
        }

        inner.state = LockState::Unlocked;
        inner.master_password = Some(Zeroizing::new(password.to_owned()));
        inner.entries = entries;
        inner.sort_entries();
        self.arm_idle_timer(inner);
        debug!(count = inner.entries.len(), "vault unlocked");
        Ok(())
    }

    /// Unconditionally transition to `Locked`. Idempotent. Zeroizes the
    /// held master password, clears the entry set, and cancels both timers.
    pub async fn lock(&self) {
        let mut inner = self.inner.write().await;
        inner.clear();
        debug!("vault locked");
    }

    /// Rotate the master password: the verification token and every entry
    /// are re-encrypted under `new_password` (staged commit, see
    /// [`Authenticator::rotate`]), then the in-memory password is replaced.
    /// Plaintext entries are unaffected.
    pub async fn change_password(&self, new_password: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        let current = inner.require_unlocked()?.to_owned();
        validate_master_password(new_password)?;
        self.auth
            .rotate(&inner.entries, &current, new_password)
            .await?;
        inner.master_password = Some(Zeroizing::new(new_password.to_owned()));
        self.arm_idle_timer(&mut inner);
        Ok(())
    }

    // ── Entry CRUD ──────────────────────────────────────────────────────

    pub async fn add_entry(&self, draft: EntryDraft) -> Result<Entry, VaultError> {
        let mut inner = self.inner.write().await;
        let password = inner.require_unlocked()?.to_owned();
        draft.validate()?;

        let now = now_millis();
        let entry = draft.into_entry(now);
        let record = crypto::encrypt(&encode_entry(&entry)?, &password)?;
        self.store
            .put_record(&entry.id, record, Some(entry.created_at))
            .await?;

        inner.entries.push(entry.clone());
        inner.sort_entries();
        self.arm_idle_timer(&mut inner);
        Ok(entry)
    }

    /// Merge `patch` onto an existing entry. `id` and `created_at` are
    /// preserved; `updated_at` is stamped now.
    pub async fn update_entry(&self, id: &str, patch: EntryPatch) -> Result<Entry, VaultError> {
        let mut inner = self.inner.write().await;
        let password = inner.require_unlocked()?.to_owned();

        let index = inner
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_owned()))?;
        let mut entry = inner.entries[index].clone();
        patch.apply(&mut entry, now_millis())?;

        let record = crypto::encrypt(&encode_entry(&entry)?, &password)?;
        self.store
            .put_record(id, record, Some(entry.created_at))
            .await?;

        inner.entries[index] = entry.clone();
        inner.sort_entries();
        self.arm_idle_timer(&mut inner);
        Ok(entry)
    }

    pub async fn delete_entry(&self, id: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner.require_unlocked()?;
        self.store.delete_record(id).await?;
        inner.entries.retain(|e| e.id != id);
        self.arm_idle_timer(&mut inner);
        Ok(())
    }

    /// Case-insensitive substring match over title, url, username, and
    /// tags. A blank query returns the full set in its current sort order.
    pub async fn search_entries(&self, query: &str) -> Vec<Entry> {
        let inner = self.inner.read().await;
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return inner.entries.clone();
        }
        inner
            .entries
            .iter()
            .filter(|e| {
                e.title.to_lowercase().contains(&query)
                    || e.url.to_lowercase().contains(&query)
                    || e.username.to_lowercase().contains(&query)
                    || e.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    // ── Timers & activity ───────────────────────────────────────────────

    /// User-activity signal: reschedules the idle timer while unlocked.
    pub async fn record_activity(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == LockState::Unlocked {
            self.arm_idle_timer(&mut inner);
        }
    }

    /// Cancels any pending idle timer and, while unlocked with a nonzero
    /// timeout, arms a fresh one. Rescheduling always cancels before arming.
    fn arm_idle_timer(&self, inner: &mut SessionInner) {
        if let Some(handle) = inner.idle_timer.take() {
            handle.abort();
        }
        let minutes = inner.settings.auto_lock_minutes;
        if minutes == 0 {
            return;
        }
        let session = self.clone();
        inner.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(minutes) * 60)).await;
            debug!("idle timeout elapsed, locking vault");
            session.lock().await;
        }));
    }

    /// Arm the clipboard-clear timer: after the configured delay, run
    /// `clear` (the OS clipboard itself is the caller's concern). Replaces
    /// any pending clear; canceled on lock. A zero delay disables clearing.
    pub async fn schedule_clipboard_clear<F>(&self, clear: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.write().await;
        if let Some(handle) = inner.clipboard_timer.take() {
            handle.abort();
        }
        let secs = inner.settings.clipboard_clear_secs;
        if secs == 0 {
            return;
        }
        inner.clipboard_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(secs))).await;
            clear();
        }));
    }

    // ── Preferences ─────────────────────────────────────────────────────

    /// Persist a new idle timeout. While unlocked, the timer is immediately
    /// rescheduled from the new value rather than waiting for activity.
    pub async fn set_auto_lock_minutes(&self, minutes: u32) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner.settings.auto_lock_minutes = minutes;
        self.store
            .set_item(KEY_AUTO_LOCK_TIMEOUT, &minutes.to_string())
            .await?;
        if inner.state == LockState::Unlocked {
            self.arm_idle_timer(&mut inner);
        }
        Ok(())
    }

    pub async fn set_clipboard_clear_secs(&self, secs: u32) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner.settings.clipboard_clear_secs = secs;
        self.store
            .set_item(KEY_CLIPBOARD_CLEAR_TIME, &secs.to_string())
            .await
    }

    pub async fn set_dark_mode(&self, enabled: bool) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner.settings.dark_mode = enabled;
        self.store.set_item(KEY_DARK_MODE, &enabled.to_string()).await
    }

    pub async fn set_locale(&self, locale: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner.settings.locale = locale.to_owned();
        self.store.set_item(KEY_LOCALE, locale).await
    }

    // ── Observers ───────────────────────────────────────────────────────

    pub async fn lock_state(&self) -> LockState {
        self.inner.read().await.state
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.state == LockState::Locked
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.read().await.loading
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.inner.read().await.entries.clone()
    }

    pub async fn settings(&self) -> VaultSettings {
        self.inner.read().await.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn session() -> VaultSession {
        VaultSession::open(Arc::new(MemoryStore::new())).await.unwrap()
    }

    fn draft(title: &str) -> EntryDraft {
        EntryDraft {
            title: title.into(),
            password: "entry-pw".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_locked_and_empty() {
        let session = session().await;
        assert!(session.is_locked().await);
        assert!(session.entries().await.is_empty());
    }

    #[tokio::test]
    async fn crud_requires_unlock() {
        let session = session().await;
        let err = session.add_entry(draft("GitHub")).await.unwrap_err();
        assert!(matches!(err, VaultError::VaultLocked));
        let err = session.delete_entry("nope").await.unwrap_err();
        assert!(matches!(err, VaultError::VaultLocked));
        let err = session
            .update_entry("nope", EntryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::VaultLocked));
        let err = session.change_password("new password").await.unwrap_err();
        assert!(matches!(err, VaultError::VaultLocked));
    }

    #[tokio::test]
    async fn setup_guard_rejects_second_setup() {
        let session = session().await;
        session.setup("master password").await.unwrap();
        session.add_entry(draft("GitHub")).await.unwrap();
        session.lock().await;

        let err = session.setup("another password").await.unwrap_err();
        assert!(matches!(err, VaultError::AlreadyInitialized));
        // Existing data is intact.
        session.unlock("master password").await.unwrap();
        assert_eq!(session.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn lock_is_idempotent_and_wipes_state() {
        let session = session().await;
        session.setup("master password").await.unwrap();
        session.add_entry(draft("GitHub")).await.unwrap();
        session.lock().await;
        session.lock().await;
        assert!(session.is_locked().await);
        assert!(session.entries().await.is_empty());
    }

    #[tokio::test]
    async fn search_matches_title_url_username_tags() {
        let session = session().await;
        session.setup("master password").await.unwrap();
        session.add_entry(draft("GitHub")).await.unwrap();
        session.add_entry(draft("Gitlab")).await.unwrap();
        session
            .add_entry(EntryDraft {
                title: "Twitter".into(),
                username: "bluebird".into(),
                tags: vec!["social".into()],
                password: "entry-pw".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let hits = session.search_entries("git").await;
        let mut titles: Vec<String> = hits.into_iter().map(|e| e.title).collect();
        titles.sort();
        assert_eq!(titles, vec!["GitHub", "Gitlab"]);

        assert_eq!(session.search_entries("BLUEBIRD").await.len(), 1);
        assert_eq!(session.search_entries("social").await.len(), 1);
        assert_eq!(session.search_entries("").await.len(), 3);
        assert_eq!(session.search_entries("   ").await.len(), 3);
        assert!(session.search_entries("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn update_missing_entry_reports_not_found() {
        let session = session().await;
        session.setup("master password").await.unwrap();
        let err = session
            .update_entry("absent", EntryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn settings_persist_through_store() {
        let store = Arc::new(MemoryStore::new());
        let session = VaultSession::open(store.clone()).await.unwrap();
        session.set_auto_lock_minutes(15).await.unwrap();
        session.set_locale("en-US").await.unwrap();

        let reopened = VaultSession::open(store).await.unwrap();
        let settings = reopened.settings().await;
        assert_eq!(settings.auto_lock_minutes, 15);
        assert_eq!(settings.locale, "en-US");
    }
}
