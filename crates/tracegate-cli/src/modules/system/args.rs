use clap::{Args, Subcommand};

use super::types::SessionStoreKind;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Create or update a context")]
    SetContext(SetContextArgs),
    #[command(about = "Set the active context")]
    UseContext(UseContextArgs),
    #[command(about = "Print the active context name")]
    CurrentContext,
    #[command(about = "List known context names")]
    GetContexts,
}

#[derive(Args)]
pub struct SetContextArgs {
    #[arg(help = "Context name")]
    pub name: String,
    #[arg(long, help = "API base URL")]
    pub addr: Option<String>,
    #[arg(long, value_enum, help = "Where the session is kept")]
    pub session_store: Option<SessionStoreKind>,
    #[arg(long, help = "YAML route table for this context")]
    pub routes: Option<String>,
}

#[derive(Args)]
pub struct UseContextArgs {
    #[arg(help = "Context name")]
    pub name: String,
}
