// crates/permalign-cli/src/main.rs
//
// CLI entrypoint for permalign.
//
// Aligns the hidden units of two networks with Frank-Wolfe weight matching,
// applies saved permutations, and reports layer-wise similarity.

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use commands::apply::ApplyCmd;
use commands::matching::MatchCmd;
use commands::objective::ObjectiveCmd;
use config::{CliConfig, DEFAULT_CONFIG_PATH};
use output::OutputFormat;

/// permalign: permutation alignment of neural network weights.
#[derive(Parser, Debug)]
#[command(
    name = "permalign",
    version = "0.1.0",
    about = "Align the hidden units of two networks by Frank-Wolfe weight matching"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Output format (overrides the config file).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Find the permutations aligning a permutee network to a fixed one.
    Match(MatchCmd),

    /// Permute a parameter set with saved permutations.
    Apply(ApplyCmd),

    /// Similarity of two networks at identity or under given permutations.
    Objective(ObjectiveCmd),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = CliConfig::load(&cli.config);
    let log_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Fall back to defaults if the config file is missing or malformed.
    let config = match loaded {
        Ok(cfg) => {
            tracing::info!("Loaded configuration from {}", cli.config);
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "Could not load config from {}: {}. Using defaults.",
                cli.config,
                e
            );
            CliConfig::default()
        }
    };
    let format = cli.format.unwrap_or(config.output_format);

    match &cli.command {
        Commands::Match(cmd) => commands::matching::run(cmd, &config, format)?,
        Commands::Apply(cmd) => commands::apply::run(cmd)?,
        Commands::Objective(cmd) => commands::objective::run(cmd, format)?,
    }

    Ok(())
}
