use clap::Args;

#[derive(Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long, env = "TRACEGATE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long, help = "Login location to resume from (e.g. /login?redirect=%2Frumors)")]
    pub resume: Option<String>,
}

#[derive(Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long, env = "TRACEGATE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
}
