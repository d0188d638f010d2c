use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Identity, Session};
use crate::error::StoreError;

/// On-disk shape of a session: flat string values under stable keys, the
/// identity serialized as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl PersistedSession {
    pub fn from_session(session: &Session) -> Result<Self, StoreError> {
        let identity = session
            .identity()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            access_token: session.access_token().map(str::to_string),
            refresh_token: session.refresh_token().map(str::to_string),
            identity,
        })
    }

    /// Rebuilds a session. An unreadable identity is dropped so the guard
    /// re-resolves it instead of failing startup.
    #[must_use]
    pub fn into_session(self) -> Session {
        let identity = self.identity.as_deref().and_then(|raw| {
            serde_json::from_str::<Identity>(raw)
                .map_err(|err| {
                    warn!(event = "session_identity_invalid", error = %err);
                })
                .ok()
        });
        Session::new(self.access_token, self.refresh_token, identity)
    }
}

/// Durable storage behind the session store. Calls are synchronous and are
/// expected to be fast and local.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError>;
    fn save(&self, record: &PersistedSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    record: Mutex<Option<PersistedSession>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(record: PersistedSession) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<PersistedSession> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file backend. Writes go through a sibling temp file and a rename so
/// a reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        let temp = self.temp_path();
        fs::write(&temp, contents)?;
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "session written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
