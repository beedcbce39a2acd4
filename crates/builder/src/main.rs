//! UpCloud image builder - command line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;

/// Validate UpCloud image build definitions
#[derive(Debug, Parser)]
#[command(name = "upcloud-builder", version, about)]
struct Cli {
    /// Log filter, e.g. `info` or `config=debug`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, default_value = "pretty", value_parser = ["json", "pretty"])]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a build definition, reporting every problem found
    Validate {
        /// Build definition (YAML)
        #[arg(short, long, default_value = "build.yaml")]
        config: PathBuf,

        /// User variable available as {{user `name`}}
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_pair)]
        vars: Vec<(String, String)>,

        /// Setting merged over the build definition
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_pair)]
        overrides: Vec<(String, String)>,
    },

    /// Write an example build definition
    Example {
        /// Destination file
        #[arg(short, long, default_value = "build.yaml")]
        output: PathBuf,
    },
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    types::utils::parse_key_value(s)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load .env file if it exists
    let dotenv_result = dotenv::dotenv();

    // Initialize logging
    init_logging(&cli.log_level, &cli.log_format)?;

    match dotenv_result {
        Ok(path) => info!("Loaded environment variables from {}", path.display()),
        Err(e) if !e.not_found() => warn!("Could not load .env file: {}", e),
        Err(_) => {}
    }

    match cli.command {
        Command::Validate {
            config,
            vars,
            overrides,
        } => app::validate(&config, vars, overrides),
        Command::Example { output } => {
            app::write_example(&output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Initialize logging to stderr
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to initialize JSON logging")?;
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to initialize pretty logging")?;
        }
    }

    Ok(())
}
