use std::fs;
use std::path::{Path, PathBuf};

use super::types::{CliConfig, CliContext};
use crate::cli_args::{ConfigArgs, ConfigCommand};
use crate::DEFAULT_ADDR;

pub(crate) fn handle_config_command(
    args: ConfigArgs,
    config: &mut CliConfig,
) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::SetContext(args) => {
            let entry = config
                .contexts
                .entry(args.name.clone())
                .or_insert_with(|| CliContext {
                    addr: DEFAULT_ADDR.to_string(),
                    session_store: Default::default(),
                    routes: None,
                    username: None,
                    last_login_at: None,
                });
            if let Some(addr) = args.addr {
                entry.addr = addr.trim_end_matches('/').to_string();
            }
            if let Some(store) = args.session_store {
                entry.session_store = store;
            }
            if let Some(routes) = args.routes {
                entry.routes = Some(routes);
            }
            config.current_context = Some(args.name);
        }
        ConfigCommand::UseContext(args) => {
            if !config.contexts.contains_key(&args.name) {
                anyhow::bail!("context not found: {}", args.name);
            }
            config.current_context = Some(args.name);
        }
        ConfigCommand::CurrentContext => {
            if let Some(current) = config.current_context.clone() {
                println!("{current}");
            }
        }
        ConfigCommand::GetContexts => {
            let mut names: Vec<_> = config.contexts.keys().cloned().collect();
            names.sort();
            for name in names {
                let marker = if config.current_context.as_ref() == Some(&name) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name}");
            }
        }
    }
    Ok(())
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".tracegate"))
}

fn config_path() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join("config.json"))
}

/// File holding the persisted session of `context_name`.
pub(crate) fn session_path(context_name: &str) -> anyhow::Result<PathBuf> {
    if context_name.is_empty()
        || context_name.contains(['/', '\\'])
        || context_name.starts_with('.')
    {
        anyhow::bail!("invalid context name: {context_name}");
    }
    Ok(home_dir()?
        .join("sessions")
        .join(format!("{context_name}.json")))
}

pub(crate) fn load_config() -> anyhow::Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config = serde_json::from_str(&contents)?;
    Ok(config)
}

pub(crate) fn save_config(config: &CliConfig) -> anyhow::Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub(crate) fn ensure_secure_addr(addr: &str, allow_insecure: bool) -> anyhow::Result<()> {
    if addr.starts_with("http://") && !allow_insecure {
        anyhow::bail!("refusing to use http:// without --insecure");
    }
    Ok(())
}
