pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const IDENTITY_PATH: &str = "/api/users/me";

pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const HOME_ROUTE: &str = "/";
pub const FORBIDDEN_ROUTE: &str = "/403";
pub const RETURN_PARAM: &str = "redirect";

/// Persisted session keys. Kept stable so an existing record rehydrates.
pub const KEY_ACCESS_TOKEN: &str = "token";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_IDENTITY: &str = "user";

pub const CODE_OK: i64 = 200;
pub const CODE_BAD_REQUEST: i64 = 400;
pub const CODE_UNAUTHORIZED: i64 = 401;
pub const CODE_FORBIDDEN: i64 = 403;
pub const CODE_NOT_FOUND: i64 = 404;
pub const CODE_SERVER_ERROR: i64 = 500;

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_USER: &str = "USER";
