use crate::cli_args::*;
use crate::modules::auth::{handle_login, handle_logout, handle_register, handle_whoami};
use crate::modules::navigate::{handle_navigate, handle_routes};
use crate::modules::request::handle_request;
use crate::modules::system::CommandContext;

pub(crate) async fn handle_command(
    command: Command,
    ctx: &mut CommandContext<'_>,
) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => handle_login(args, ctx).await?,
        Command::Register(args) => handle_register(args, ctx).await?,
        Command::Logout => handle_logout(ctx).await?,
        Command::Whoami => handle_whoami(ctx).await?,
        Command::Request(args) => handle_request(args, ctx).await?,
        Command::Navigate(args) => handle_navigate(args, ctx).await?,
        Command::Routes => handle_routes(ctx),
        Command::Config(_) => unreachable!(),
    }

    Ok(())
}
