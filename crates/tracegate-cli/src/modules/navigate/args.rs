use clap::Args;

#[derive(Args)]
pub struct NavigateArgs {
    #[arg(help = "Target path (e.g. /rumors)")]
    pub path: String,
    #[arg(long, help = "Path the navigation starts from")]
    pub from: Option<String>,
}
