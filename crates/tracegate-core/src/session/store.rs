use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use tracing::{debug, warn};

use super::{Identity, PersistedSession, Session, SessionBackend, TokenPair};
use crate::error::StoreError;

/// Owner of the current session.
///
/// Every write holds the lock across the in-memory swap and the persistence
/// call, so writers are serialized and readers only ever observe whole
/// sessions. Memory is authoritative: a failed persistence write is reported
/// but the new session stays in effect.
pub struct SessionStore {
    state: RwLock<Session>,
    backend: Box<dyn SessionBackend>,
}

impl SessionStore {
    /// Rehydrates from `backend`.
    pub fn open(backend: Box<dyn SessionBackend>) -> Result<Self, StoreError> {
        let session = backend
            .load()?
            .map(PersistedSession::into_session)
            .unwrap_or_default();
        debug!(
            authenticated = !session.is_anonymous(),
            identity = session.identity().is_some(),
            "session rehydrated"
        );
        Ok(Self {
            state: RwLock::new(session),
            backend,
        })
    }

    #[must_use]
    pub fn get(&self) -> Session {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, session: Session) -> Result<(), StoreError> {
        let mut guard = self.write_guard();
        *guard = session;
        self.persist(&guard)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.write_guard();
        *guard = Session::anonymous();
        self.backend.clear()
    }

    /// Clears only if the session still carries `expected_refresh`.
    pub fn clear_if_refresh(&self, expected_refresh: &str) -> Result<bool, StoreError> {
        let mut guard = self.write_guard();
        if guard.refresh_token() != Some(expected_refresh) {
            return Ok(false);
        }
        *guard = Session::anonymous();
        self.backend.clear()?;
        Ok(true)
    }

    /// Installs refreshed tokens if the session still carries
    /// `expected_refresh`; returns `None` when it was replaced or cleared in
    /// the meantime.
    pub fn rotate_tokens(&self, expected_refresh: &str, pair: TokenPair) -> Option<Session> {
        let mut guard = self.write_guard();
        if guard.refresh_token() != Some(expected_refresh) {
            return None;
        }
        *guard = guard.rotated(pair);
        if let Err(err) = self.persist(&guard) {
            warn!(event = "session_persist_failed", error = %err);
        }
        Some(guard.clone())
    }

    /// Attaches a resolved identity to the current token. Returns `None` if
    /// the session went anonymous while the identity was being fetched.
    pub fn set_identity(&self, identity: Identity) -> Option<Session> {
        let mut guard = self.write_guard();
        if guard.is_anonymous() {
            return None;
        }
        *guard = guard.with_identity(identity);
        if let Err(err) = self.persist(&guard) {
            warn!(event = "session_persist_failed", error = %err);
        }
        Some(guard.clone())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, session: &Session) -> Result<(), StoreError> {
        if session.is_anonymous() && session.refresh_token().is_none() {
            return self.backend.clear();
        }
        let record = PersistedSession::from_session(session)?;
        self.backend.save(&record)
    }
}
