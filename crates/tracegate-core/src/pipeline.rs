//! Staged request pipeline: decorate, dispatch, interpret, then at most one
//! refresh-and-replay when the session turns out to be expired.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::{CancelToken, CancellationSignal};
use crate::envelope::interpret;
use crate::error::ApiError;
use crate::events::{SessionEvent, SessionEvents};
use crate::refresh::RefreshCoordinator;
use crate::session::{Session, SessionStore};
use crate::settings::RefreshPolicy;
use crate::transport::{decorate, RequestDescriptor, Transport};

/// One in-flight call. The descriptor is shared and never mutated; both the
/// first attempt and the replay decorate a fresh copy.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub descriptor: Arc<RequestDescriptor>,
}

struct Attempt {
    result: Result<Value, ApiError>,
    access_token: Option<String>,
}

pub struct Pipeline {
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    cancel: CancellationSignal,
    events: SessionEvents,
    policy: RefreshPolicy,
    login_route: String,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        coordinator: Arc<RefreshCoordinator>,
        events: SessionEvents,
    ) -> Self {
        Self {
            store,
            transport,
            coordinator,
            cancel: CancellationSignal::new(),
            events,
            policy: RefreshPolicy::default(),
            login_route: crate::constants::LOGIN_ROUTE.to_string(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Settles every call that has not completed yet as `Cancelled`. A refresh
    /// cycle already in flight runs to completion.
    pub fn cancel_all(&self) {
        info!(event = "requests_cancelled", generation = self.cancel.generation());
        self.cancel.cancel_all();
    }

    /// Sends `request`, replaying it once after a refresh if the session had
    /// expired. Emits exactly one `RequestFailed` event when the call fails.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Value, ApiError> {
        let (pending, cancel) = self.register(request);
        let result = self.cancellable(cancel, self.run(&pending)).await;
        if let Err(err) = &result {
            debug!(request_id = %pending.id, error = %err, "request failed");
            self.events.emit(SessionEvent::RequestFailed {
                request_id: pending.id,
                kind: err.kind(),
                message: err.to_string(),
            });
        }
        result
    }

    /// A single attempt with the current session and no recovery: an expired
    /// session comes back as `AuthExpired` and the store is left untouched.
    pub async fn send_once(&self, request: RequestDescriptor) -> Result<Value, ApiError> {
        let (pending, cancel) = self.register(request);
        self.cancellable(cancel, async {
            self.attempt(&pending.descriptor, &self.store.get())
                .await
                .result
        })
        .await
    }

    /// A single attempt decorated with an explicit session instead of the
    /// store's. Not cancellable.
    pub async fn send_as(
        &self,
        request: &RequestDescriptor,
        session: &Session,
    ) -> Result<Value, ApiError> {
        self.attempt(request, session).await.result
    }

    fn register(&self, request: RequestDescriptor) -> (PendingRequest, CancelToken) {
        let cancel = self.cancel.token();
        let pending = PendingRequest {
            id: Uuid::now_v7(),
            descriptor: Arc::new(request),
        };
        (pending, cancel)
    }

    async fn cancellable<F>(&self, mut cancel: CancelToken, work: F) -> Result<Value, ApiError>
    where
        F: std::future::Future<Output = Result<Value, ApiError>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ApiError::Cancelled),
            result = work => result,
        }
    }

    async fn run(&self, pending: &PendingRequest) -> Result<Value, ApiError> {
        // Read the session right before decorating; never across an await.
        let first = self.attempt(&pending.descriptor, &self.store.get()).await;
        match first.result {
            Err(ApiError::AuthExpired) => self.recover(pending, first.access_token).await,
            other => other,
        }
    }

    async fn recover(
        &self,
        pending: &PendingRequest,
        stale_access: Option<String>,
    ) -> Result<Value, ApiError> {
        if self.policy == RefreshPolicy::SurfaceOnly {
            return Err(self.expire(pending));
        }
        let session = self.store.get();
        if session.refresh_token().is_none() {
            debug!(request_id = %pending.id, "no refresh token; not refreshing");
            return Err(self.expire(pending));
        }

        if let Err(err) = self
            .coordinator
            .request_refresh(stale_access.as_deref())
            .await
        {
            debug!(request_id = %pending.id, error = %err, "refresh did not recover session");
            return Err(self.expire(pending));
        }

        debug!(request_id = %pending.id, path = %pending.descriptor.path, "replaying request");
        let replay = self.attempt(&pending.descriptor, &self.store.get()).await;
        match replay.result {
            Err(ApiError::AuthExpired) => Err(self.expire(pending)),
            other => other,
        }
    }

    async fn attempt(&self, request: &RequestDescriptor, session: &Session) -> Attempt {
        let decorated = decorate(request, session);
        let access_token = session.access_token().map(str::to_string);
        let result = match self.transport.dispatch(&decorated).await {
            Ok(reply) => interpret(&reply),
            Err(err) => Err(err),
        };
        Attempt {
            result,
            access_token,
        }
    }

    fn expire(&self, pending: &PendingRequest) -> ApiError {
        info!(event = "session_expired", request_id = %pending.id);
        if let Err(err) = self.store.clear() {
            warn!(event = "session_clear_failed", error = %err);
        }
        self.events.emit(SessionEvent::Expired {
            redirect: self.login_route.clone(),
        });
        ApiError::AuthExpired
    }
}
