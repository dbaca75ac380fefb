mod api;
mod cli;
mod config;
mod state;
mod task;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;

/// Default log filter when neither RUST_LOG nor the config file sets one
const DEFAULT_LOG_FILTER: &str = "storefront=info,warn";

fn log_filter(config: &Config, verbose: bool) -> String {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return filter;
    }
    if verbose {
        return "storefront=debug,info".to_string();
    }
    config
        .logging
        .filter
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config is read before logging starts so it can supply the filter
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(&config, cli.output.verbose)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(e) = config_error {
        tracing::warn!("Failed to load configuration, using defaults: {:#}", e);
    }

    tracing::debug!("Starting storefront v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::run(cli, config).await {
        cli::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
