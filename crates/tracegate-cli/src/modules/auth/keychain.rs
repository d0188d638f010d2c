#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use tracegate_core::{PersistedSession, SessionBackend, StoreError};
use tracing::debug;
#[cfg(not(test))]
use tracing::warn;

const KEYRING_SERVICE: &str = "tracegate";

/// Session record kept in the OS keychain, one entry per context.
pub(crate) struct KeyringBackend {
    context_name: String,
}

impl KeyringBackend {
    pub(crate) fn new(context_name: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
        }
    }
}

impl SessionBackend for KeyringBackend {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let Some(raw) = keyring_get(&self.context_name)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        keyring_set(&self.context_name, &raw)?;
        debug!(context = %self.context_name, "stored session in keyring");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        keyring_delete(&self.context_name)
    }
}

fn keyring_key(context_name: &str) -> String {
    format!("session::{context_name}")
}

#[cfg(test)]
fn keyring_store() -> &'static Mutex<HashMap<String, String>> {
    static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

#[cfg(test)]
static KEYRING_TEST_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
pub(crate) fn lock_keyring_tests_sync() -> std::sync::MutexGuard<'static, ()> {
    KEYRING_TEST_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn clear_keyring_mock() {
    if let Ok(mut map) = keyring_store().lock() {
        map.clear();
    }
}

#[cfg(not(test))]
fn keyring_entry(context_name: &str) -> Result<keyring::Entry, StoreError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_key(context_name))
        .map_err(|err| StoreError::Backend(format!("failed to access keyring: {err}")))
}

#[cfg(not(test))]
fn keyring_set(context_name: &str, value: &str) -> Result<(), StoreError> {
    keyring_entry(context_name)?
        .set_password(value)
        .map_err(|err| StoreError::Backend(format!("failed to store session: {err}")))
}

#[cfg(not(test))]
fn keyring_get(context_name: &str) -> Result<Option<String>, StoreError> {
    match keyring_entry(context_name)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(StoreError::Backend(format!(
            "failed to load session from keychain for context '{context_name}': {err}"
        ))),
    }
}

#[cfg(not(test))]
fn keyring_delete(context_name: &str) -> Result<(), StoreError> {
    match keyring_entry(context_name)?.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => {
            warn!(context = %context_name, "failed to delete session from keychain: {err}");
            Ok(())
        }
    }
}

#[cfg(test)]
fn keyring_set(context_name: &str, value: &str) -> Result<(), StoreError> {
    let mut store = keyring_store()
        .lock()
        .map_err(|_| StoreError::Backend("failed to lock keyring store".to_string()))?;
    store.insert(
        format!("{KEYRING_SERVICE}/{}", keyring_key(context_name)),
        value.to_string(),
    );
    Ok(())
}

#[cfg(test)]
fn keyring_get(context_name: &str) -> Result<Option<String>, StoreError> {
    let store = keyring_store()
        .lock()
        .map_err(|_| StoreError::Backend("failed to lock keyring store".to_string()))?;
    Ok(store
        .get(&format!("{KEYRING_SERVICE}/{}", keyring_key(context_name)))
        .cloned())
}

#[cfg(test)]
fn keyring_delete(context_name: &str) -> Result<(), StoreError> {
    let mut store = keyring_store()
        .lock()
        .map_err(|_| StoreError::Backend("failed to lock keyring store".to_string()))?;
    store.remove(&format!("{KEYRING_SERVICE}/{}", keyring_key(context_name)));
    Ok(())
}
