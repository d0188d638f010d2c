use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session::Session;

/// An outbound call as issued by a caller. Immutable once handed to the
/// pipeline; credentials are added on a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_json(body)
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }
}

/// Returns a copy of `request` carrying `Authorization: Bearer <token>` when
/// the session has an access token, or an unchanged copy otherwise.
#[must_use]
pub fn decorate(request: &RequestDescriptor, session: &Session) -> RequestDescriptor {
    let mut decorated = request.clone();
    let Some(token) = session.access_token() else {
        return decorated;
    };
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            decorated.headers.insert(AUTHORIZATION, value);
        }
        Err(err) => {
            warn!(event = "credential_header_invalid", error = %err);
        }
    }
    decorated
}

/// Raw response as seen by the pipeline before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn envelope(code: i64, data: Value, message: Option<&str>) -> Self {
        let body = serde_json::json!({
            "success": code == crate::constants::CODE_OK,
            "code": code,
            "data": data,
            "message": message,
        });
        let status = u16::try_from(code).unwrap_or(200);
        Self::new(status, body.to_string())
    }
}

/// Moves a decorated request over the wire. Failing to reach the server is
/// `ApiError::Network`; any response, including error statuses, is a reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<HttpReply, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<HttpReply, ApiError> {
        let url = self.url(&request.path);
        let builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };
        let builder = if let Some(body) = &request.body {
            builder.json(body)
        } else {
            builder
        };
        debug!(method = %request.method, url = %url, "http request");
        let start = std::time::Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(
            method = %request.method,
            url = %url,
            status = status,
            elapsed_ms = start.elapsed().as_millis(),
            "http response"
        );
        Ok(HttpReply { status, body })
    }
}
