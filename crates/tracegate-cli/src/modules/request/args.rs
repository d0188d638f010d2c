use clap::Args;

#[derive(Args)]
pub struct RequestArgs {
    #[arg(help = "HTTP method")]
    pub method: String,
    #[arg(help = "API path (e.g. /api/rumors)")]
    pub path: String,
    #[arg(long, help = "JSON request body")]
    pub data: Option<String>,
    #[arg(long = "query", short = 'q', help = "Query parameter as key=value")]
    pub query: Vec<String>,
}
