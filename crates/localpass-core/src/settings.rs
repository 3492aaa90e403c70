//! Unencrypted, non-sensitive user preferences.
//!
//! Persisted per-key in the store's metadata namespace under the historical
//! key names, so existing vaults keep their settings. Absent or unparsable
//! values fall back to defaults.

use std::sync::Arc;

use crate::error::VaultError;
use crate::store::VaultStore;

pub const KEY_AUTO_LOCK_TIMEOUT: &str = "autoLockTimeout";
pub const KEY_CLIPBOARD_CLEAR_TIME: &str = "clipboardClearTime";
pub const KEY_DARK_MODE: &str = "darkMode";
pub const KEY_LOCALE: &str = "locale";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    /// Idle minutes before auto-lock. 0 disables the idle timer.
    pub auto_lock_minutes: u32,
    /// Seconds before a copied secret is cleared. 0 disables.
    pub clipboard_clear_secs: u32,
    pub dark_mode: bool,
    pub locale: String,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 5,
            clipboard_clear_secs: 30,
            dark_mode: false,
            locale: "zh-CN".into(),
        }
    }
}

impl VaultSettings {
    pub async fn load(store: &Arc<dyn VaultStore>) -> Result<Self, VaultError> {
        let mut settings = Self::default();
        if let Some(v) = store.get_item(KEY_AUTO_LOCK_TIMEOUT).await? {
            if let Ok(minutes) = v.parse() {
                settings.auto_lock_minutes = minutes;
            }
        }
        if let Some(v) = store.get_item(KEY_CLIPBOARD_CLEAR_TIME).await? {
            if let Ok(secs) = v.parse() {
                settings.clipboard_clear_secs = secs;
            }
        }
        if let Some(v) = store.get_item(KEY_DARK_MODE).await? {
            settings.dark_mode = v == "true";
        }
        if let Some(v) = store.get_item(KEY_LOCALE).await? {
            settings.locale = v;
        }
        Ok(settings)
    }
}
