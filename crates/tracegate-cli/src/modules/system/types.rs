use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracegate_core::SessionClient;

#[derive(Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    pub contexts: HashMap<String, CliContext>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    #[default]
    File,
    Keyring,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct CliContext {
    pub addr: String,
    #[serde(default)]
    pub session_store: SessionStoreKind,
    #[serde(default)]
    pub routes: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<String>,
}

pub struct CommandContext<'a> {
    pub client: SessionClient,
    pub context_name: String,
    pub config: &'a mut CliConfig,
}
