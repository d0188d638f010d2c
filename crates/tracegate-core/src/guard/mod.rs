//! Navigation guard: authorizes route changes against the session.

mod routes;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::{SessionEvent, SessionEvents};
use crate::refresh::RefreshCoordinator;
use crate::session::{Identity, Session, SessionStore};
use crate::settings::GuardSettings;

pub use routes::{RouteRule, RouteTable};

/// Fetches the identity behind the current access token.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_identity(&self) -> Result<Identity, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Anonymous,
    Authenticated,
    AuthenticatedNoIdentity,
}

impl GuardState {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        match (session.access_token(), session.identity()) {
            (None, _) => Self::Anonymous,
            (Some(_), Some(_)) => Self::Authenticated,
            (Some(_), None) => Self::AuthenticatedNoIdentity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub target: String,
    /// Any one of these grants access; empty means no role check.
    pub required_roles: BTreeSet<String>,
    pub public: bool,
    pub from: Option<String>,
}

impl NavigationIntent {
    #[must_use]
    pub fn protected(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            required_roles: BTreeSet::new(),
            public: false,
            from: None,
        }
    }

    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    AlreadyAuthenticated,
    LoginRequired,
    SessionExpired,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    Redirect {
        to: String,
        return_to: Option<String>,
        reason: RedirectReason,
    },
}

impl GuardDecision {
    /// Redirect location with the return path encoded under `return_param`.
    #[must_use]
    pub fn location(&self, return_param: &str) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Redirect {
                to,
                return_to: Some(back),
                ..
            } => Some(format!(
                "{to}?{return_param}={}",
                urlencoding::encode(back)
            )),
            Self::Redirect { to, .. } => Some(to.clone()),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Outcome of the pure decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Decided(GuardDecision),
    /// A token is present but the identity is unknown; resolve it and decide
    /// again.
    NeedsIdentity,
}

enum Resolution {
    Resolved(Identity),
    /// Refreshed, but the identity lookup failed for a reason other than
    /// expiry.
    Unavailable,
    Expired,
    Cancelled,
}

pub struct NavigationGuard {
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    resolver: Arc<dyn IdentityResolver>,
    events: SessionEvents,
    routes: RouteTable,
    settings: GuardSettings,
}

impl NavigationGuard {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        resolver: Arc<dyn IdentityResolver>,
        events: SessionEvents,
        routes: RouteTable,
        settings: GuardSettings,
    ) -> Self {
        Self {
            store,
            coordinator,
            resolver,
            events,
            routes,
            settings,
        }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    /// Builds the intent for navigating to `path` from the route table.
    #[must_use]
    pub fn intent_for(&self, path: &str, from: Option<&str>) -> NavigationIntent {
        let target = routes::strip_query(path);
        let target = if target.is_empty() { "/" } else { target };
        let rule = self.routes.resolve(target);
        NavigationIntent {
            target: target.to_string(),
            required_roles: rule.roles,
            public: rule.public,
            from: from.map(str::to_string),
        }
    }

    /// Pure decision for `intent` in `state`.
    #[must_use]
    pub fn decide(
        &self,
        state: GuardState,
        intent: &NavigationIntent,
        identity: Option<&Identity>,
    ) -> Verdict {
        if intent.public {
            return Verdict::Decided(if state == GuardState::Anonymous {
                GuardDecision::Allow
            } else {
                self.redirect(&self.settings.home_route, None, RedirectReason::AlreadyAuthenticated)
            });
        }
        let identity = match (state, identity) {
            (GuardState::Anonymous, _) => {
                return Verdict::Decided(self.redirect(
                    &self.settings.login_route,
                    Some(intent.target.clone()),
                    RedirectReason::LoginRequired,
                ));
            }
            (GuardState::AuthenticatedNoIdentity, _) | (GuardState::Authenticated, None) => {
                return Verdict::NeedsIdentity;
            }
            (GuardState::Authenticated, Some(identity)) => identity,
        };
        if !intent.required_roles.is_empty() && !identity.has_any_role(&intent.required_roles) {
            return Verdict::Decided(self.redirect(
                &self.settings.forbidden_route,
                None,
                RedirectReason::Forbidden,
            ));
        }
        Verdict::Decided(GuardDecision::Allow)
    }

    /// Decides `intent` against the current session, resolving the identity
    /// (with one refresh attempt) when it is not known yet.
    pub async fn evaluate(&self, intent: NavigationIntent) -> GuardDecision {
        let session = self.store.get();
        let state = GuardState::of(&session);
        let decision = match self.decide(state, &intent, session.identity()) {
            Verdict::Decided(decision) => decision,
            Verdict::NeedsIdentity => match self.resolve(&session).await {
                Resolution::Resolved(identity) => self.decide_resolved(&intent, &identity),
                Resolution::Unavailable => self.decide_without_identity(&intent),
                Resolution::Expired => self.expire(&intent),
                Resolution::Cancelled => self.decide_after_cancel(&intent),
            },
        };
        debug!(
            target_path = %intent.target,
            from = intent.from.as_deref().unwrap_or("-"),
            state = ?state,
            allowed = decision.is_allowed(),
            "navigation evaluated"
        );
        decision
    }

    /// Return path carried by a login location or query string, or home
    /// when absent or not a local path.
    #[must_use]
    pub fn resume_target(&self, query: &str) -> String {
        let query = query.split_once('?').map_or(query, |(_, query)| query);
        let candidate = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == self.settings.return_param)
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|value| value.into_owned());
        match candidate {
            Some(path) if is_local_path(&path) && path != self.settings.login_route => path,
            _ => self.settings.home_route.clone(),
        }
    }

    async fn resolve(&self, session: &Session) -> Resolution {
        match self.resolver.resolve_identity().await {
            Ok(identity) => return self.attach(identity),
            Err(ApiError::Cancelled) => return Resolution::Cancelled,
            Err(err) => debug!(error = %err, "identity resolution failed; refreshing"),
        }
        if let Err(err) = self
            .coordinator
            .request_refresh(session.access_token())
            .await
        {
            debug!(error = %err, "refresh during navigation failed");
            return Resolution::Expired;
        }
        match self.resolver.resolve_identity().await {
            Ok(identity) => self.attach(identity),
            Err(ApiError::AuthExpired) => Resolution::Expired,
            Err(ApiError::Cancelled) => Resolution::Cancelled,
            Err(err) => {
                // The refreshed tokens are valid; only the lookup failed.
                warn!(event = "identity_unavailable", error = %err);
                Resolution::Unavailable
            }
        }
    }

    fn attach(&self, identity: Identity) -> Resolution {
        match self.store.set_identity(identity.clone()) {
            Some(_) => Resolution::Resolved(identity),
            None => Resolution::Cancelled,
        }
    }

    fn decide_resolved(&self, intent: &NavigationIntent, identity: &Identity) -> GuardDecision {
        match self.decide(GuardState::Authenticated, intent, Some(identity)) {
            Verdict::Decided(decision) => decision,
            Verdict::NeedsIdentity => self.decide_without_identity(intent),
        }
    }

    /// Session kept but identity unknown: it holds no roles.
    fn decide_without_identity(&self, intent: &NavigationIntent) -> GuardDecision {
        if intent.required_roles.is_empty() {
            GuardDecision::Allow
        } else {
            self.redirect(&self.settings.forbidden_route, None, RedirectReason::Forbidden)
        }
    }

    /// The session changed under the resolution (typically a logout); decide
    /// against what is there now without touching it.
    fn decide_after_cancel(&self, intent: &NavigationIntent) -> GuardDecision {
        let current = self.store.get();
        match self.decide(GuardState::of(&current), intent, current.identity()) {
            Verdict::Decided(decision) => decision,
            Verdict::NeedsIdentity => self.redirect(
                &self.settings.login_route,
                Some(intent.target.clone()),
                RedirectReason::LoginRequired,
            ),
        }
    }

    fn expire(&self, intent: &NavigationIntent) -> GuardDecision {
        info!(event = "session_expired", target_path = %intent.target);
        if let Err(err) = self.store.clear() {
            warn!(event = "session_clear_failed", error = %err);
        }
        self.events.emit(SessionEvent::Expired {
            redirect: self.settings.login_route.clone(),
        });
        self.redirect(
            &self.settings.login_route,
            Some(intent.target.clone()),
            RedirectReason::SessionExpired,
        )
    }

    fn redirect(&self, to: &str, return_to: Option<String>, reason: RedirectReason) -> GuardDecision {
        GuardDecision::Redirect {
            to: to.to_string(),
            return_to,
            reason,
        }
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
