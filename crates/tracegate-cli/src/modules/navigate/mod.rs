pub(crate) mod args;

use serde_json::json;
use tracegate_core::GuardDecision;

use crate::cli_args::NavigateArgs;
use crate::modules::system::CommandContext;

pub(crate) async fn handle_navigate(
    args: NavigateArgs,
    ctx: &mut CommandContext<'_>,
) -> anyhow::Result<()> {
    let guard = ctx.client.guard();
    let intent = guard.intent_for(&args.path, args.from.as_deref());
    let from = intent.from.clone();
    let decision = guard.evaluate(intent).await;
    let location = decision.location(&guard.settings().return_param);
    let output = match &decision {
        GuardDecision::Allow => json!({
            "decision": "allow",
            "path": args.path,
            "from": from,
        }),
        GuardDecision::Redirect {
            to,
            return_to,
            reason,
        } => json!({
            "decision": "redirect",
            "to": to,
            "return_to": return_to,
            "reason": reason,
            "location": location,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub(crate) fn handle_routes(ctx: &CommandContext<'_>) {
    for rule in ctx.client.guard().routes().rules() {
        let access = if rule.public {
            "public".to_string()
        } else if rule.roles.is_empty() {
            "session".to_string()
        } else {
            rule.roles.iter().cloned().collect::<Vec<_>>().join(",")
        };
        println!("{:<24} {access}", rule.path);
    }
}
