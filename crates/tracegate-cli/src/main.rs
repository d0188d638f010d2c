use std::sync::Arc;

use clap::Parser;
use tracegate_core::{
    ApiError, ClientSettings, FileBackend, HttpTransport, SessionBackend, SessionClient,
    SessionEvent,
};
use tracing_subscriber::EnvFilter;

mod cli_args;
mod cli_command;
mod modules;

use crate::cli_args::*;
use crate::cli_command::handle_command;
use crate::modules::auth::KeyringBackend;
use crate::modules::system::{
    ensure_secure_addr, handle_config_command, load_config, save_config, session_path, CliContext,
    CommandContext, SessionStoreKind,
};

pub(crate) const DEFAULT_ADDR: &str = "https://127.0.0.1:8080";
pub(crate) const DEFAULT_CONTEXT: &str = "default";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let mut config = load_config()?;

    if let Command::Config(args) = cli.command {
        handle_config_command(args, &mut config)?;
        save_config(&config)?;
        return Ok(());
    }

    let context_name = cli
        .context
        .clone()
        .or_else(|| config.current_context.clone())
        .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
    let context = config.contexts.get(&context_name).cloned();
    let addr = cli
        .addr
        .clone()
        .or_else(|| context.as_ref().map(|ctx| ctx.addr.clone()))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    ensure_secure_addr(&addr, cli.insecure)?;
    let routes = cli
        .routes
        .clone()
        .or_else(|| context.as_ref().and_then(|ctx| ctx.routes.clone()));
    let store_kind = context
        .as_ref()
        .map(|ctx| ctx.session_store)
        .unwrap_or_default();

    let client = build_client(&addr, routes, store_kind, &context_name, cli.insecure)?;
    config
        .contexts
        .entry(context_name.clone())
        .or_insert_with(|| CliContext {
            addr: addr.clone(),
            session_store: store_kind,
            routes: None,
            username: None,
            last_login_at: None,
        });

    let mut ctx = CommandContext {
        client,
        context_name,
        config: &mut config,
    };
    let mut events = ctx.client.subscribe();
    let result = handle_command(cli.command, &mut ctx).await;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Expired { redirect } = event {
            eprintln!("session expired; sign in again ({redirect})");
        }
    }
    save_config(ctx.config)?;
    result
}

fn build_client(
    addr: &str,
    routes: Option<String>,
    store_kind: SessionStoreKind,
    context_name: &str,
    insecure: bool,
) -> anyhow::Result<SessionClient> {
    let mut settings = ClientSettings::from_env().with_base_url(addr.trim_end_matches('/'));
    if let Some(routes) = routes {
        settings = settings.with_routes_path(routes);
    }
    let http = reqwest::Client::builder()
        .danger_accept_invalid_certs(insecure)
        .timeout(settings.request_timeout)
        .build()?;
    let transport = HttpTransport::with_client(http, settings.base_url.clone());
    let backend: Box<dyn SessionBackend> = match store_kind {
        SessionStoreKind::File => Box::new(FileBackend::new(session_path(context_name)?)),
        SessionStoreKind::Keyring => Box::new(KeyringBackend::new(context_name)),
    };
    Ok(SessionClient::with_transport(
        settings,
        backend,
        Arc::new(transport),
    )?)
}

/// Turns a pipeline failure into a user-facing error.
pub(crate) fn api_failure(action: &str, err: ApiError) -> anyhow::Error {
    match err {
        ApiError::AuthExpired => {
            anyhow::anyhow!("{action}: session expired (run `tracegate login`)")
        }
        other => anyhow::anyhow!("{action}: {other}"),
    }
}

fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
