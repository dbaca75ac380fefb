//! CLI module for storefront
//!
//! One-shot subcommands run against a fresh product store; `shell` keeps a
//! single store alive across commands.

mod commands;
mod output;
mod shell;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::HttpProductSource;
use crate::config::Config;
use crate::state::ProductStore;

pub use output::{print_error, OutputFormat};

/// Storefront - product catalogue client
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    /// Product API base URL (overrides the config file)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, list and search products
    Product {
        #[command(subcommand)]
        command: commands::product::ProductCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },

    /// Interactive shell over a single product store
    Shell,
}

/// Build a product store backed by the HTTP API
pub fn open_store(config: &Config, base_url: Option<&str>) -> anyhow::Result<ProductStore> {
    let source = HttpProductSource::new(base_url.unwrap_or(&config.api.base_url))?;
    tracing::debug!("Using product API at {}", source.base_url());
    Ok(ProductStore::new(Arc::new(source)))
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;

    match cli.command {
        Commands::Product { command } => {
            let mut store = open_store(&config, cli.base_url.as_deref())?;
            commands::product::run(command, &mut store, format, quiet).await
        }
        Commands::Config { command } => commands::config::run(command, format, quiet).await,
        Commands::Shell => {
            let store = open_store(&config, cli.base_url.as_deref())?;
            shell::run(store).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_search() {
        let cli = Cli::try_parse_from(["storefront", "--json", "product", "search", "red shoe"]).unwrap();
        assert_eq!(cli.output.format(), OutputFormat::Json);
        match cli.command {
            Commands::Product {
                command: commands::product::ProductCommands::Search { query, .. },
            } => assert_eq!(query, "red shoe"),
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "storefront",
            "product",
            "get",
            "7",
            "--base-url",
            "http://localhost:3000",
            "-q",
        ])
        .unwrap();
        assert!(cli.output.quiet);
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["storefront", "product", "get", "seven"]).is_err());
    }

    #[test]
    fn test_base_url_override() {
        let config = Config::default();
        assert!(open_store(&config, Some("http://localhost:3000")).is_ok());
    }
}
