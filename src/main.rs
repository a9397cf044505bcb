use clap::Parser;
use dotenvy::dotenv;
use tracing::{debug, error};

use plugin_agent::bootstrap::app_context::{AppContext, AppServices};
use plugin_agent::bootstrap::config::Config;
use plugin_agent::presentation::cli::{Cli, commands};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "plugin_agent=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "plugin_agent_failed");
            eprintln!("{err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let cfg = Config::from_env()?;
    debug!(?cfg, "config_loaded");
    let services = AppServices::from_config(&cfg)?;
    let ctx = AppContext::new(cfg, services);
    commands::run(&cli, &ctx).await
}
