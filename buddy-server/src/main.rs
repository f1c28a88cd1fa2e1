use std::path::PathBuf;

use anyhow::Context;
use buddy_server::config::ServerConfig;
use buddy_server::{app, State};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Study buddy server: registration, friendships and compatibility ranking.
#[derive(Parser, Debug)]
#[command(name = "buddy-server", version)]
struct Cli {
    /// TOML config file.
    #[arg(short, long, env = "BUDDY_CONFIG")]
    config: Option<PathBuf>,
    /// Port to listen on, overriding the config file.
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = State::open(&config).with_context(|| format!("opening store at {}", config.db_path.display()))?;
    let addr = config.addr()?;
    info!(%addr, db = %config.db_path.display(), "listening");
    axum::Server::bind(&addr)
        .serve(app(state).into_make_service())
        .await?;
    Ok(())
}
