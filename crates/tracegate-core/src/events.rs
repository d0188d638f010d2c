use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Session side effects surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    LoggedOut,
    Refreshed { cycle: u64 },
    /// The session is gone; the application should navigate to `redirect`.
    Expired { redirect: String },
    /// One per failed logical call, after any refresh-and-replay.
    RequestFailed {
        request_id: Uuid,
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SessionEvents {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No subscriber is fine.
        let _ = self.tx.send(event);
    }
}
