use serde::Serialize;
use thiserror::Error;

use crate::constants::{CODE_BAD_REQUEST, CODE_FORBIDDEN, CODE_NOT_FOUND, CODE_UNAUTHORIZED};

/// Failure of a call made through the request pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network_error: {0}")]
    Network(String),
    #[error("auth_expired")]
    AuthExpired,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad_request: {0}")]
    BadRequest(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("server_error: {code} {message}")]
    Server { code: i64, message: String },
    #[error("decode_error: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    AuthExpired,
    Forbidden,
    BadRequest,
    NotFound,
    Server,
    Decode,
    Cancelled,
}

impl ApiError {
    /// Maps a business (or fallback HTTP) status code to a failure.
    ///
    /// Unknown 4xx codes are treated as caller errors, everything else as a
    /// remote failure.
    #[must_use]
    pub fn from_code(code: i64, message: Option<String>) -> Self {
        let message = message.unwrap_or_default();
        match code {
            CODE_UNAUTHORIZED => Self::AuthExpired,
            CODE_FORBIDDEN => Self::Forbidden(message),
            CODE_NOT_FOUND => Self::NotFound(message),
            CODE_BAD_REQUEST => Self::BadRequest(message),
            402..=499 => Self::BadRequest(message),
            _ => Self::Server { code, message },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::AuthExpired => ErrorKind::AuthExpired,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Server { .. } => ErrorKind::Server,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session storage format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("session storage backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid route table: {0}")]
    Routes(String),
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}
