#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use toolwarden::Config;
use toolwarden::cli::Cli;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn log_level(verbose: bool, configured: &str) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    configured.parse().unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose, &config.log_level))
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {e}");
    }

    toolwarden::app::dispatch(cli, config).await
}
