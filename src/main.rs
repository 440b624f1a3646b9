//! Smartflow - coordinated smart-wallet buy signal engine
//!
//! Signals are informational only. Nothing here places trades.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use smartflow::cli::commands;
use smartflow::config::Config;

/// Smartflow - smart-wallet buy signal engine
#[derive(Parser)]
#[command(name = "smartflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "SMARTFLOW_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the signal engine
    Run,

    /// Show current configuration (secrets masked)
    Config,

    /// Compute confidence for hypothetical inputs
    Confidence {
        /// Wallet scores, comma separated (e.g. 8,8.5,9)
        #[arg(long, value_delimiter = ',', required = true)]
        scores: Vec<f64>,

        /// One-hour volume in USD
        #[arg(long, default_value = "0")]
        volume: f64,

        /// Market cap in USD
        #[arg(long, default_value = "0")]
        market_cap: f64,

        /// Five-minute volume growth (0.05 = 5%)
        #[arg(long, default_value = "0")]
        growth: f64,

        /// Token type: meme, defi, nft, gaming, ai, new, exchange, stable
        #[arg(long, default_value = "unknown")]
        token_type: String,

        /// Whale activity detected
        #[arg(long)]
        whale: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("smartflow=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Confidence {
            scores,
            volume,
            market_cap,
            growth,
            token_type,
            whale,
        } => commands::confidence(&config, &scores, volume, market_cap, growth, &token_type, whale),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
