pub(crate) mod auth;
pub(crate) mod navigate;
pub(crate) mod request;
pub(crate) mod system;
