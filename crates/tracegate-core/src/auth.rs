use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::SessionEvent;
use crate::guard::IdentityResolver;
use crate::pipeline::Pipeline;
use crate::session::{Identity, Session, TokenPair};
use crate::settings::ApiPaths;
use crate::transport::RequestDescriptor;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Data of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "id")]
    pub user_id: Option<Value>,
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl AuthPayload {
    #[must_use]
    pub fn into_session(self) -> Session {
        let user_id = match self.user_id {
            Some(Value::String(id)) => id,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let identity = Identity {
            user_id,
            username: self.username,
            roles: self.roles,
        };
        Session::from_tokens(
            TokenPair {
                access_token: self.token,
                refresh_token: self.refresh_token,
            },
            Some(identity),
        )
    }
}

/// Login, registration, logout and identity lookup on top of the pipeline.
pub struct AuthApi {
    pipeline: Arc<Pipeline>,
    paths: ApiPaths,
}

impl AuthApi {
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, paths: ApiPaths) -> Self {
        Self { pipeline, paths }
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        let body = json!({
            "username": request.username.trim(),
            "password": request.password,
        });
        self.authenticate(&self.paths.login, body).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|err| ApiError::Decode(format!("register request: {err}")))?;
        self.authenticate(&self.paths.register, body).await
    }

    /// Ends the session locally and then tells the server. Pending calls
    /// settle as cancelled; a failed remote logout is only logged.
    pub async fn logout(&self) {
        let session = self.pipeline.store().get();
        self.pipeline.cancel_all();
        if let Err(err) = self.pipeline.store().clear() {
            warn!(event = "session_clear_failed", error = %err);
        }
        self.pipeline.events().emit(SessionEvent::LoggedOut);
        info!(event = "logged_out");

        if session.is_anonymous() {
            return;
        }
        let request = RequestDescriptor::new(reqwest::Method::POST, self.paths.logout.clone());
        if let Err(err) = self.pipeline.send_as(&request, &session).await {
            warn!(event = "remote_logout_failed", error = %err);
        }
    }

    /// One attempt against the identity endpoint, without refresh.
    pub async fn resolve_identity(&self) -> Result<Identity, ApiError> {
        let data = self
            .pipeline
            .send_once(RequestDescriptor::get(self.paths.identity.clone()))
            .await?;
        serde_json::from_value::<Identity>(data)
            .map_err(|err| ApiError::Decode(format!("identity response: {err}")))
    }

    async fn authenticate(&self, path: &str, body: Value) -> Result<Session, ApiError> {
        let request = RequestDescriptor::post(path.to_string(), body);
        // Credentials from an earlier session must not leak into the call.
        let data = self
            .pipeline
            .send_as(&request, &Session::anonymous())
            .await?;
        let payload: AuthPayload = serde_json::from_value(data)
            .map_err(|err| ApiError::Decode(format!("auth response: {err}")))?;
        let username = payload.username.clone();
        let session = payload.into_session();
        if let Err(err) = self.pipeline.store().set(session.clone()) {
            warn!(event = "session_persist_failed", error = %err);
        }
        debug!(path, "session established");
        info!(event = "logged_in", username = %username);
        self.pipeline
            .events()
            .emit(SessionEvent::LoggedIn { username });
        Ok(session)
    }
}

#[async_trait]
impl IdentityResolver for AuthApi {
    async fn resolve_identity(&self) -> Result<Identity, ApiError> {
        AuthApi::resolve_identity(self).await
    }
}
