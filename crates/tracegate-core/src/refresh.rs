//! Single-flight token refresh.
//!
//! However many requests discover an expired access token at once, exactly
//! one refresh call goes out. Callers register as waiters on the live
//! [`RefreshCycle`]; the cycle runs on its own task so that cancelling a
//! waiter never abandons a refresh halfway through a token rotation.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::envelope::interpret;
use crate::error::ApiError;
use crate::events::{SessionEvent, SessionEvents};
use crate::session::{Session, SessionStore, TokenPair};
use crate::transport::{RequestDescriptor, Transport};

/// Remote side of the refresh protocol.
#[async_trait]
pub trait RefreshEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

/// `POST <path>` with `{ "refreshToken": ... }`, answered by an envelope
/// whose data carries the new token pair.
pub struct HttpRefreshEndpoint {
    transport: Arc<dyn Transport>,
    path: String,
}

impl HttpRefreshEndpoint {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }
}

#[async_trait]
impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let request =
            RequestDescriptor::post(self.path.clone(), json!({ "refreshToken": refresh_token }));
        let reply = self.transport.dispatch(&request).await?;
        let data = interpret(&reply)?;
        serde_json::from_value::<TokenPair>(data)
            .map_err(|err| ApiError::Decode(format!("refresh response: {err}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    InFlight,
    Settled,
}

type Outcome = Result<Session, ApiError>;

struct RefreshCycle {
    id: u64,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

struct Inner {
    state: CycleState,
    current: Option<RefreshCycle>,
    next_cycle: u64,
    calls: u64,
}

/// Owns the refresh protocol for one session store. Share it (by `Arc`)
/// between every component that may refresh.
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    endpoint: Arc<dyn RefreshEndpoint>,
    events: SessionEvents,
    inner: Arc<Mutex<Inner>>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        endpoint: Arc<dyn RefreshEndpoint>,
        events: SessionEvents,
    ) -> Self {
        Self {
            store,
            endpoint,
            events,
            inner: Arc::new(Mutex::new(Inner {
                state: CycleState::Idle,
                current: None,
                next_cycle: 1,
                calls: 0,
            })),
        }
    }

    #[must_use]
    pub fn state(&self) -> CycleState {
        lock(&self.inner).state
    }

    /// Number of refresh calls issued to the endpoint so far.
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        lock(&self.inner).calls
    }

    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        lock(&self.inner)
            .current
            .as_ref()
            .map_or(0, |cycle| cycle.waiters.len())
    }

    /// Joins the in-flight cycle or starts a new one.
    ///
    /// `stale_access` is the access token the failing call was sent with.
    /// When the session already holds a different token, a refresh has
    /// landed since that dispatch and the current session is returned
    /// without a network call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_refresh(&self, stale_access: Option<&str>) -> RefreshHandle {
        let mut inner = lock(&self.inner);
        if let Some(cycle) = inner.current.as_mut() {
            let (tx, rx) = oneshot::channel();
            cycle.waiters.push_back(tx);
            debug!(cycle = cycle.id, waiters = cycle.waiters.len(), "joined refresh cycle");
            return RefreshHandle::waiting(rx);
        }

        let session = self.store.get();
        if let (Some(stale), Some(current)) = (stale_access, session.access_token()) {
            if stale != current {
                debug!("access token already rotated; skipping refresh");
                return RefreshHandle::ready(Ok(session));
            }
        }
        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            drop(inner);
            info!(event = "refresh_unavailable", "no refresh token; clearing session");
            if let Err(err) = self.store.clear() {
                warn!(event = "session_clear_failed", error = %err);
            }
            return RefreshHandle::ready(Err(ApiError::AuthExpired));
        };

        let id = inner.next_cycle;
        inner.next_cycle += 1;
        inner.calls += 1;
        inner.state = CycleState::InFlight;
        let (tx, rx) = oneshot::channel();
        let mut waiters = VecDeque::new();
        waiters.push_back(tx);
        inner.current = Some(RefreshCycle { id, waiters });
        drop(inner);

        info!(event = "refresh_started", cycle = id);
        tokio::spawn(drive(
            id,
            refresh_token,
            self.store.clone(),
            self.endpoint.clone(),
            self.events.clone(),
            self.inner.clone(),
        ));
        RefreshHandle::waiting(rx)
    }
}

async fn drive(
    id: u64,
    refresh_token: String,
    store: Arc<SessionStore>,
    endpoint: Arc<dyn RefreshEndpoint>,
    events: SessionEvents,
    inner: Arc<Mutex<Inner>>,
) {
    // Settles the cycle even if the endpoint panics or the task is aborted.
    let settlement = Settlement {
        id,
        inner,
        store: store.clone(),
        refresh_token: refresh_token.clone(),
        done: false,
    };
    let outcome = match endpoint.refresh(&refresh_token).await {
        Ok(pair) => match store.rotate_tokens(&refresh_token, pair) {
            Some(session) => {
                info!(event = "refresh_succeeded", cycle = id);
                events.emit(SessionEvent::Refreshed { cycle: id });
                Ok(session)
            }
            None => {
                // Logout or a new login replaced the session mid-flight.
                let current = store.get();
                info!(
                    event = "refresh_superseded",
                    cycle = id,
                    authenticated = !current.is_anonymous()
                );
                if current.is_anonymous() {
                    Err(ApiError::AuthExpired)
                } else {
                    Ok(current)
                }
            }
        },
        Err(err) => {
            warn!(event = "refresh_failed", cycle = id, error = %err);
            failed(&store, &refresh_token)
        }
    };
    settlement.finish(outcome);
}

/// Clears the session unless it moved on, then reports what is left.
fn failed(store: &SessionStore, refresh_token: &str) -> Outcome {
    if let Err(err) = store.clear_if_refresh(refresh_token) {
        warn!(event = "session_clear_failed", error = %err);
    }
    let current = store.get();
    if current.is_anonymous() {
        Err(ApiError::AuthExpired)
    } else {
        Ok(current)
    }
}

/// Closes the live cycle and releases its waiters in arrival order.
struct Settlement {
    id: u64,
    inner: Arc<Mutex<Inner>>,
    store: Arc<SessionStore>,
    refresh_token: String,
    done: bool,
}

impl Settlement {
    fn finish(mut self, outcome: Outcome) {
        self.done = true;
        self.release(&outcome);
    }

    fn release(&self, outcome: &Outcome) {
        let waiters = {
            let mut inner = lock(&self.inner);
            if inner.current.as_ref().is_some_and(|cycle| cycle.id == self.id) {
                inner.state = CycleState::Settled;
                inner
                    .current
                    .take()
                    .map(|cycle| cycle.waiters)
                    .unwrap_or_default()
            } else {
                VecDeque::new()
            }
        };
        debug!(cycle = self.id, waiters = waiters.len(), "refresh cycle settled");
        for waiter in waiters {
            // A dropped receiver is a cancelled caller.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!(event = "refresh_abandoned", cycle = self.id);
        let outcome = failed(&self.store, &self.refresh_token);
        self.release(&outcome);
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Eventual outcome of a refresh cycle for one waiter.
pub struct RefreshHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Option<Outcome>),
    Waiting(oneshot::Receiver<Outcome>),
}

impl RefreshHandle {
    fn ready(outcome: Outcome) -> Self {
        Self {
            state: HandleState::Ready(Some(outcome)),
        }
    }

    fn waiting(rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            state: HandleState::Waiting(rx),
        }
    }
}

impl Future for RefreshHandle {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(ApiError::AuthExpired)))
            }
            HandleState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(ApiError::AuthExpired)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
