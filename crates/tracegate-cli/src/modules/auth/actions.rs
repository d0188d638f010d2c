use chrono::Utc;
use tracegate_core::{Identity, LoginRequest, RegisterRequest, RequestDescriptor, Session};
use tracing::{info, warn};

use crate::api_failure;
use crate::cli_args::{LoginArgs, RegisterArgs};
use crate::modules::system::CommandContext;

pub(crate) async fn handle_login(args: LoginArgs, ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    let password = require_password(args.password)?;
    let request = LoginRequest {
        username: args.username,
        password,
    };
    let session = ctx
        .client
        .login(&request)
        .await
        .map_err(|err| api_failure("login failed", err))?;
    record_login(ctx, &session);
    print_session(&session);

    if let Some(location) = args.resume {
        let target = ctx.client.guard().resume_target(&location);
        let login_route = ctx.client.settings().guard.login_route.clone();
        let decision = ctx.client.navigate(&target, Some(&login_route)).await;
        println!("resume: {target}");
        if !decision.is_allowed() {
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
    }
    Ok(())
}

pub(crate) async fn handle_register(
    args: RegisterArgs,
    ctx: &mut CommandContext<'_>,
) -> anyhow::Result<()> {
    let password = require_password(args.password)?;
    let request = RegisterRequest {
        username: args.username,
        password,
        email: args.email,
    };
    let session = ctx
        .client
        .register(&request)
        .await
        .map_err(|err| api_failure("registration failed", err))?;
    record_login(ctx, &session);
    print_session(&session);
    Ok(())
}

pub(crate) async fn handle_logout(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    if ctx.client.session().is_anonymous() {
        println!("not logged in");
        return Ok(());
    }
    ctx.client.logout().await;
    if let Some(context) = ctx.config.contexts.get_mut(&ctx.context_name) {
        context.username = None;
    }
    println!("logged out");
    Ok(())
}

pub(crate) async fn handle_whoami(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    if ctx.client.session().is_anonymous() {
        anyhow::bail!("not logged in (run `tracegate login`)");
    }
    let path = ctx.client.settings().paths.identity.clone();
    let data = ctx
        .client
        .send(RequestDescriptor::get(path))
        .await
        .map_err(|err| api_failure("whoami failed", err))?;
    let identity: Identity = serde_json::from_value(data)?;
    if ctx.client.store().set_identity(identity.clone()).is_none() {
        warn!(context = %ctx.context_name, "session ended before identity was stored");
    }
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

fn require_password(password: Option<String>) -> anyhow::Result<String> {
    match password {
        Some(password) if !password.trim().is_empty() => Ok(password),
        _ => anyhow::bail!("password is required (--password or TRACEGATE_PASSWORD)"),
    }
}

fn record_login(ctx: &mut CommandContext<'_>, session: &Session) {
    let username = session.identity().map(|identity| identity.username.clone());
    if let Some(context) = ctx.config.contexts.get_mut(&ctx.context_name) {
        context.username = username.clone();
        context.last_login_at = Some(Utc::now().to_rfc3339());
    }
    info!(context = %ctx.context_name, username = ?username, "session stored");
}

fn print_session(session: &Session) {
    match session.identity() {
        Some(identity) => {
            let roles: Vec<&str> = identity.roles.iter().map(String::as_str).collect();
            println!(
                "logged in as {} (roles: {})",
                identity.username,
                if roles.is_empty() {
                    "none".to_string()
                } else {
                    roles.join(", ")
                }
            );
        }
        None => println!("logged in"),
    }
}
