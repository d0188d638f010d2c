use std::env;

use tracing::warn;

/// Non-empty, trimmed value of `name`.
pub(super) fn string_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Overrides `target` with `name` when it holds an absolute path.
pub(super) fn apply_path_override(name: &str, target: &mut String) {
    let Some(value) = string_var(name) else {
        return;
    };
    if value.starts_with('/') {
        *target = value;
    } else {
        warn!(event = "config_invalid", field = name, value = %value);
    }
}
