use std::sync::Arc;

use serde_json::Value;

use crate::auth::{AuthApi, LoginRequest, RegisterRequest};
use crate::error::{ApiError, ClientError};
use crate::events::{SessionEvent, SessionEvents};
use crate::guard::{GuardDecision, NavigationGuard};
use crate::pipeline::Pipeline;
use crate::refresh::{HttpRefreshEndpoint, RefreshCoordinator};
use crate::session::{FileBackend, MemoryBackend, Session, SessionBackend, SessionStore};
use crate::settings::ClientSettings;
use crate::transport::{HttpTransport, RequestDescriptor, Transport};

/// Everything wired around one session store: one coordinator shared by the
/// pipeline and the guard.
pub struct SessionClient {
    settings: ClientSettings,
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: Arc<Pipeline>,
    auth: Arc<AuthApi>,
    guard: NavigationGuard,
    events: SessionEvents,
}

impl SessionClient {
    /// Builds a client over HTTP, persisting the session where `settings`
    /// says.
    pub fn from_settings(settings: ClientSettings) -> Result<Self, ClientError> {
        let backend: Box<dyn SessionBackend> = match &settings.session_path {
            Some(path) => Box::new(FileBackend::new(path.clone())),
            None => Box::new(MemoryBackend::new()),
        };
        Self::with_backend(settings, backend)
    }

    pub fn with_backend(
        settings: ClientSettings,
        backend: Box<dyn SessionBackend>,
    ) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(settings.base_url.clone(), settings.request_timeout)?;
        Self::with_transport(settings, backend, Arc::new(transport))
    }

    pub fn with_transport(
        settings: ClientSettings,
        backend: Box<dyn SessionBackend>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let routes = settings.route_table()?;
        let store = Arc::new(SessionStore::open(backend)?);
        let events = SessionEvents::default();
        let endpoint = Arc::new(HttpRefreshEndpoint::new(
            transport.clone(),
            settings.paths.refresh.clone(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            endpoint,
            events.clone(),
        ));
        let pipeline = Arc::new(
            Pipeline::new(store.clone(), transport, coordinator.clone(), events.clone())
                .with_policy(settings.refresh_policy)
                .with_login_route(settings.guard.login_route.clone()),
        );
        let auth = Arc::new(AuthApi::new(pipeline.clone(), settings.paths.clone()));
        let guard = NavigationGuard::new(
            store.clone(),
            coordinator.clone(),
            auth.clone(),
            events.clone(),
            routes,
            settings.guard.clone(),
        );
        Ok(Self {
            settings,
            store,
            coordinator,
            pipeline,
            auth,
            guard,
            events,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.store.get()
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
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthApi> {
        &self.auth
    }

    #[must_use]
    pub fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, request: RequestDescriptor) -> Result<Value, ApiError> {
        self.pipeline.send(request).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        self.auth.login(request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, ApiError> {
        self.auth.register(request).await
    }

    pub async fn logout(&self) {
        self.auth.logout().await;
    }

    /// Evaluates navigation to `path` coming from `from`.
    pub async fn navigate(&self, path: &str, from: Option<&str>) -> GuardDecision {
        let intent = self.guard.intent_for(path, from);
        self.guard.evaluate(intent).await
    }
}
