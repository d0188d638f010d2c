pub(crate) mod args;

use reqwest::Method;
use tracegate_core::RequestDescriptor;

use crate::api_failure;
use crate::cli_args::RequestArgs;
use crate::modules::system::CommandContext;

pub(crate) fn build_request(args: &RequestArgs) -> anyhow::Result<RequestDescriptor> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid method: {}", args.method))?;
    if !args.path.starts_with('/') {
        anyhow::bail!("path must start with '/': {}", args.path);
    }
    let mut request = RequestDescriptor::new(method, args.path.clone());
    for pair in &args.query {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("query must be key=value: {pair}");
        };
        request = request.with_query(key, value);
    }
    if let Some(data) = &args.data {
        let body = serde_json::from_str(data)
            .map_err(|err| anyhow::anyhow!("--data is not valid JSON: {err}"))?;
        request = request.with_json(body);
    }
    Ok(request)
}

pub(crate) async fn handle_request(
    args: RequestArgs,
    ctx: &mut CommandContext<'_>,
) -> anyhow::Result<()> {
    let request = build_request(&args)?;
    let data = ctx
        .client
        .send(request)
        .await
        .map_err(|err| api_failure("request failed", err))?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
