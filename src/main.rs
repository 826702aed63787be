//! Grid band bot - main entry point
//!
//! Subcommands:
//! - run: poll the exchange and trade the configured symbol
//! - reconcile: rebuild saved state from the exchange once and exit

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grid_band_bot::{BotConfig, Side};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-band-bot")]
#[command(about = "Bollinger-band grid bot for a single futures symbol", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the trading loop
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,

        /// Manage the open basket to completion without opening new ones
        #[arg(long)]
        drain: bool,

        /// Open a basket at market immediately if none is active
        #[arg(long, value_enum)]
        seed: Option<SeedSide>,
    },

    /// Reconcile saved state against the exchange once and exit
    Reconcile {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SeedSide {
    Buy,
    Sell,
}

impl From<SeedSide> for Side {
    fn from(side: SeedSide) -> Self {
        match side {
            SeedSide::Buy => Side::Buy,
            SeedSide::Sell => Side::Sell,
        }
    }
}

fn setup_logging(verbose: bool, log_dir: &str, label: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let log_filename = format!("bot-{}.log", label);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::daily(log_dir, &log_filename);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "Log file: {}",
        Path::new(log_dir).join(&log_filename).display()
    );
    Ok(guard)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. } | Commands::Reconcile { config } => config.clone(),
    };
    let config = BotConfig::from_file(&config_path)?;

    // Guard flushes the file writer on drop
    let _guard = setup_logging(cli.verbose, &config.log_dir, config.env_label())?;
    info!("Loaded configuration from: {}", config_path);

    match cli.command {
        Commands::Run { drain, seed, .. } => {
            commands::live::run(config, drain, seed.map(Side::from))
        }
        Commands::Reconcile { .. } => commands::live::reconcile_once(config),
    }
}
