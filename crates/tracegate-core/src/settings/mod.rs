use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECONDS, FORBIDDEN_ROUTE, HOME_ROUTE, IDENTITY_PATH,
    LOGIN_PATH, LOGIN_ROUTE, LOGOUT_PATH, REFRESH_PATH, REGISTER_PATH, REGISTER_ROUTE,
    RETURN_PARAM,
};
use crate::error::SettingsError;
use crate::guard::RouteTable;

mod env_config;

/// What the pipeline does with an expired session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Refresh once (single-flight) and replay the call once.
    #[default]
    RefreshAndReplay,
    /// Clear the session and surface `AuthExpired` without refreshing.
    SurfaceOnly,
}

impl RefreshPolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "refresh_and_replay" | "refresh-and-replay" | "refresh" => Some(Self::RefreshAndReplay),
            "surface_only" | "surface-only" | "surface" => Some(Self::SurfaceOnly),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RefreshAndReplay => "refresh_and_replay",
            Self::SurfaceOnly => "surface_only",
        }
    }
}

/// Remote endpoints used by the auth flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPaths {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub refresh: String,
    pub identity: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            login: LOGIN_PATH.to_string(),
            register: REGISTER_PATH.to_string(),
            logout: LOGOUT_PATH.to_string(),
            refresh: REFRESH_PATH.to_string(),
            identity: IDENTITY_PATH.to_string(),
        }
    }
}

/// Well-known navigation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSettings {
    pub login_route: String,
    pub register_route: String,
    pub home_route: String,
    pub forbidden_route: String,
    /// Query parameter on the login route carrying the return path.
    pub return_param: String,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            login_route: LOGIN_ROUTE.to_string(),
            register_route: REGISTER_ROUTE.to_string(),
            home_route: HOME_ROUTE.to_string(),
            forbidden_route: FORBIDDEN_ROUTE.to_string(),
            return_param: RETURN_PARAM.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub refresh_policy: RefreshPolicy,
    pub paths: ApiPaths,
    pub guard: GuardSettings,
    /// Where the session record lives; `None` keeps it in memory only.
    pub session_path: Option<PathBuf>,
    /// YAML route table; `None` uses the built-in table.
    pub routes_path: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            refresh_policy: RefreshPolicy::default(),
            paths: ApiPaths::default(),
            guard: GuardSettings::default(),
            session_path: None,
            routes_path: None,
        }
    }
}

impl ClientSettings {
    /// Reads `TRACEGATE_*` variables. Invalid values are logged and replaced
    /// by defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env_config::string_var("TRACEGATE_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let request_timeout = match env::var("TRACEGATE_TIMEOUT_SECONDS") {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
                _ => {
                    warn!(event = "config_invalid", field = "TRACEGATE_TIMEOUT_SECONDS", value = %value);
                    defaults.request_timeout
                }
            },
            Err(_) => defaults.request_timeout,
        };
        let refresh_policy = match env::var("TRACEGATE_REFRESH_POLICY") {
            Ok(value) => RefreshPolicy::parse(&value).unwrap_or_else(|| {
                warn!(event = "config_invalid", field = "TRACEGATE_REFRESH_POLICY", value = %value);
                RefreshPolicy::default()
            }),
            Err(_) => RefreshPolicy::default(),
        };

        let mut paths = defaults.paths;
        env_config::apply_path_override("TRACEGATE_LOGIN_PATH", &mut paths.login);
        env_config::apply_path_override("TRACEGATE_REGISTER_PATH", &mut paths.register);
        env_config::apply_path_override("TRACEGATE_LOGOUT_PATH", &mut paths.logout);
        env_config::apply_path_override("TRACEGATE_REFRESH_PATH", &mut paths.refresh);
        env_config::apply_path_override("TRACEGATE_IDENTITY_PATH", &mut paths.identity);

        let mut guard = defaults.guard;
        env_config::apply_path_override("TRACEGATE_LOGIN_ROUTE", &mut guard.login_route);
        env_config::apply_path_override("TRACEGATE_HOME_ROUTE", &mut guard.home_route);
        env_config::apply_path_override("TRACEGATE_FORBIDDEN_ROUTE", &mut guard.forbidden_route);

        Self {
            base_url,
            request_timeout,
            refresh_policy,
            paths,
            guard,
            session_path: env_config::string_var("TRACEGATE_SESSION_PATH").map(PathBuf::from),
            routes_path: env_config::string_var("TRACEGATE_ROUTES").map(PathBuf::from),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    #[must_use]
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_routes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.routes_path = Some(path.into());
        self
    }

    /// Loads the configured route table, or the built-in one.
    pub fn route_table(&self) -> Result<RouteTable, SettingsError> {
        match &self.routes_path {
            Some(path) => RouteTable::from_path(path),
            None => Ok(RouteTable::builtin_for(&self.guard)),
        }
    }
}
