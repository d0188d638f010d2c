mod backend;
mod store;

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

pub use backend::{FileBackend, MemoryBackend, PersistedSession, SessionBackend};
pub use store::SessionStore;

/// Resolved user behind an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Identity {
    #[must_use]
    pub fn new<I, R>(user_id: impl Into<String>, username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True when at least one of `required` is held.
    #[must_use]
    pub fn has_any_role(&self, required: &BTreeSet<String>) -> bool {
        required.iter().any(|role| self.roles.contains(role))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(value) => value,
        Repr::Number(value) => value.to_string(),
    })
}

/// Credentials minted by login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The authoritative credential record.
///
/// `identity` is only ever present alongside an access token; the
/// constructors drop it otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    identity: Option<Identity>,
}

impl Session {
    #[must_use]
    pub fn new(
        access_token: Option<String>,
        refresh_token: Option<String>,
        identity: Option<Identity>,
    ) -> Self {
        let access_token = access_token.filter(|token| !token.trim().is_empty());
        let refresh_token = refresh_token.filter(|token| !token.trim().is_empty());
        let identity = if access_token.is_some() {
            identity
        } else {
            None
        };
        Self {
            access_token,
            refresh_token,
            identity,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_tokens(pair: TokenPair, identity: Option<Identity>) -> Self {
        Self::new(Some(pair.access_token), pair.refresh_token, identity)
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_none()
    }

    /// Replaces both tokens, keeping the identity. A missing refresh token in
    /// `pair` keeps the current one.
    #[must_use]
    pub(crate) fn rotated(&self, pair: TokenPair) -> Self {
        let refresh_token = pair.refresh_token.or_else(|| self.refresh_token.clone());
        Self::new(
            Some(pair.access_token),
            refresh_token,
            self.identity.clone(),
        )
    }

    #[must_use]
    pub(crate) fn with_identity(&self, identity: Identity) -> Self {
        Self::new(
            self.access_token.clone(),
            self.refresh_token.clone(),
            Some(identity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_access_token() {
        let identity = Identity::new("1", "alice", ["USER"]);
        let session = Session::new(None, Some("r".into()), Some(identity.clone()));
        assert!(session.identity().is_none());
        assert_eq!(session.refresh_token(), Some("r"));

        let session = Session::new(Some("a".into()), None, Some(identity.clone()));
        assert_eq!(session.identity(), Some(&identity));
    }

    #[test]
    fn blank_tokens_are_absent() {
        let session = Session::new(Some("  ".into()), Some(String::new()), None);
        assert!(session.is_anonymous());
        assert!(session.refresh_token().is_none());
    }

    #[test]
    fn rotation_keeps_refresh_token_when_server_omits_it() {
        let session = Session::new(
            Some("a1".into()),
            Some("r1".into()),
            Some(Identity::new("1", "alice", ["USER"])),
        );
        let rotated = session.rotated(TokenPair {
            access_token: "a2".into(),
            refresh_token: None,
        });
        assert_eq!(rotated.access_token(), Some("a2"));
        assert_eq!(rotated.refresh_token(), Some("r1"));
        assert!(rotated.identity().is_some());
    }

    #[test]
    fn identity_accepts_numeric_ids_and_aliases() -> Result<(), serde_json::Error> {
        let identity: Identity =
            serde_json::from_str(r#"{"id": 42, "username": "bob", "roles": ["ADMIN","USER"]}"#)?;
        assert_eq!(identity.user_id, "42");
        assert!(identity.has_role("ADMIN"));

        let pair: TokenPair = serde_json::from_str(r#"{"token": "t", "refreshToken": "r"}"#)?;
        assert_eq!(pair.access_token, "t");
        assert_eq!(pair.refresh_token.as_deref(), Some("r"));
        Ok(())
    }
}
