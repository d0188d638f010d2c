use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::ROLE_ADMIN;
use crate::error::SettingsError;
use crate::settings::GuardSettings;

/// Access rule for one route pattern.
///
/// Patterns are absolute paths whose segments are literals, `:name`
/// placeholders matching any single segment, or a final `*` matching the
/// prefix itself and anything beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub path: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl RouteRule {
    #[must_use]
    pub fn protected(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            public: false,
            roles: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            public: true,
            ..Self::protected(path)
        }
    }

    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut pattern = segments(&self.path);
        let mut target = segments(path);
        loop {
            match (pattern.next(), target.next()) {
                (Some("*"), _) => return true,
                (Some(expected), Some(actual)) => {
                    if !expected.starts_with(':') && expected != actual {
                        return false;
                    }
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !self.path.starts_with('/') {
            return Err(SettingsError::Routes(format!(
                "path must be absolute: {}",
                self.path
            )));
        }
        let parts: Vec<&str> = segments(&self.path).collect();
        if let Some(pos) = parts.iter().position(|part| *part == "*") {
            if pos + 1 != parts.len() {
                return Err(SettingsError::Routes(format!(
                    "wildcard must be the last segment: {}",
                    self.path
                )));
            }
        }
        if self.public && !self.roles.is_empty() {
            return Err(SettingsError::Routes(format!(
                "public route cannot require roles: {}",
                self.path
            )));
        }
        Ok(())
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[derive(Debug, Deserialize)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<RouteRule>,
}

/// Ordered route rules; the first match wins. Unknown paths are protected
/// without role requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, SettingsError> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::builtin_for(&GuardSettings::default())
    }

    /// Login and register are public, the admin area needs `ADMIN`, the
    /// rest of the application needs a session.
    #[must_use]
    pub fn builtin_for(settings: &GuardSettings) -> Self {
        Self {
            rules: vec![
                RouteRule::public(settings.login_route.clone()),
                RouteRule::public(settings.register_route.clone()),
                RouteRule::protected("/admin/*").with_roles([ROLE_ADMIN]),
                RouteRule::protected("/rumors"),
                RouteRule::protected("/rumor/:id"),
                RouteRule::protected("/profile"),
            ],
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, SettingsError> {
        let file: RoutesFile = serde_yaml::from_str(contents)
            .map_err(|err| SettingsError::Routes(err.to_string()))?;
        Self::new(file.routes)
    }

    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
            .map_err(|err| SettingsError::Routes(format!("{}: {err}", path.display())))
    }

    #[must_use]
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Rule governing `path` (query and fragment ignored).
    #[must_use]
    pub fn resolve(&self, path: &str) -> RouteRule {
        let path = strip_query(path);
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .cloned()
            .unwrap_or_else(|| RouteRule::protected(path))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

pub(crate) fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching() {
        let rule = RouteRule::protected("/rumor/:id");
        assert!(rule.matches("/rumor/42"));
        assert!(!rule.matches("/rumor"));
        assert!(!rule.matches("/rumor/42/comments"));

        let admin = RouteRule::protected("/admin/*");
        assert!(admin.matches("/admin"));
        assert!(admin.matches("/admin/users"));
        assert!(admin.matches("/admin/logs/system"));
        assert!(!admin.matches("/administrator"));

        assert!(RouteRule::protected("/").matches("/"));
    }

    #[test]
    fn builtin_table_mirrors_application_routes() {
        let table = RouteTable::builtin();
        assert!(table.resolve("/login").public);
        assert!(table.resolve("/register?invite=1").public);
        assert!(table.resolve("/admin/users").roles.contains(ROLE_ADMIN));
        let unknown = table.resolve("/dashboard");
        assert!(!unknown.public);
        assert!(unknown.roles.is_empty());
    }

    #[test]
    fn yaml_table_is_validated() {
        let table = RouteTable::from_yaml_str(
            "routes:\n  - path: /login\n    public: true\n  - path: /ops/*\n    roles: [OPS, ADMIN]\n",
        );
        let table = match table {
            Ok(table) => table,
            Err(err) => panic!("valid table rejected: {err}"),
        };
        assert_eq!(table.rules().len(), 2);
        assert_eq!(table.resolve("/ops/queue").roles.len(), 2);

        assert!(RouteTable::from_yaml_str("routes:\n  - path: login\n").is_err());
        assert!(RouteTable::from_yaml_str("routes:\n  - path: /a/*/b\n").is_err());
        assert!(
            RouteTable::from_yaml_str("routes:\n  - path: /x\n    public: true\n    roles: [A]\n")
                .is_err()
        );
    }
}
