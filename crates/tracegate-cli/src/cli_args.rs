use clap::{ArgAction, Parser, Subcommand};

pub use crate::modules::auth::args::*;
pub use crate::modules::navigate::args::*;
pub use crate::modules::request::args::*;
pub use crate::modules::system::args::*;

#[derive(Parser)]
#[command(name = "tracegate")]
#[command(about = "Session-aware API client")]
pub struct Cli {
    #[arg(long, env = "TRACEGATE_ADDR")]
    pub addr: Option<String>,
    #[arg(long)]
    pub context: Option<String>,
    #[arg(long, env = "TRACEGATE_ROUTES", help = "YAML route table for navigate")]
    pub routes: Option<String>,
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    #[arg(long, help = "Allow http:// and invalid TLS certificates")]
    pub insecure: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Login(LoginArgs),
    Register(RegisterArgs),
    Logout,
    Whoami,
    #[command(about = "Send a request through the session pipeline")]
    Request(RequestArgs),
    #[command(about = "Evaluate navigation to a route")]
    Navigate(NavigateArgs),
    #[command(about = "Print the route table")]
    Routes,
    Config(ConfigArgs),
}
