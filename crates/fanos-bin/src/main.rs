//! Fanos - best-effort beacon delivery from the command line.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fanos_config_and_utils::{init_logging, parse_level, ConfigOverrides, FanosConfig, Paths};

/// Fanos command-line interface.
#[derive(Parser)]
#[command(name = "fanos")]
#[command(about = "Best-effort beacon delivery with a persisted retry queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for the queue store, logs and config. Defaults to ~/.fanos
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one payload, then wait for retries to settle
    Send {
        /// Endpoint; overrides the configured default
        #[arg(long, env = "FANOS_URL")]
        url: Option<String>,

        /// Extra header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Enable diagnostic logging for this instance
        #[arg(long)]
        debug: bool,

        /// JSON payload, or @path to read it from a file
        data: String,
    },
    /// Run one pass over the persisted queue
    Flush,
    /// Show the persisted queue
    Status,
    /// Drop everything in the persisted queue
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = FanosConfig::load(&paths)?;

    // Diagnostics are debug events, so a debug instance needs the filter open.
    let debug = config.debug || matches!(cli.command, Commands::Send { debug: true, .. });
    init_logging(log_level_for(&cli.log_level, debug));

    paths.ensure_dirs()?;
    if let Some(endpoint) = config.endpoint()? {
        tracing::debug!(endpoint = %endpoint, "Default endpoint");
    }

    match cli.command {
        Commands::Send {
            url,
            headers,
            debug,
            data,
        } => {
            let send = commands::SendArgs::parse(url, &headers, &data)?;
            let config = if debug {
                config.with_overrides(&ConfigOverrides {
                    debug: Some(true),
                    ..Default::default()
                })
            } else {
                config
            };
            commands::send(config, &paths, send).await?;
        }
        Commands::Flush => commands::flush(config, &paths).await?,
        Commands::Status => commands::status(&config, &paths)?,
        Commands::Clear => commands::clear(config, &paths).await?,
    }

    Ok(())
}

/// The requested level, raised to `debug` when diagnostics are on.
fn log_level_for(requested: &str, debug: bool) -> &str {
    if debug && parse_level(requested) < tracing::Level::DEBUG {
        "debug"
    } else {
        requested
    }
}
