//! Nearby CLI entry point

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nearby_cli::{
    cli::{Cli, Commands},
    config,
    demo::{self, DemoOptions},
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = execute(cli).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            print!("{}", config::to_toml(&config)?);
        }
        Commands::Demo {
            clients,
            rounds,
            tick_ms,
            seed,
            json,
        } => {
            let options = DemoOptions {
                clients,
                rounds,
                tick: Duration::from_millis(tick_ms.max(1)),
                seed,
            };
            info!("Starting demo with {} client(s)", clients);
            let report = demo::run(config, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", demo::summarize(&report));
            }
        }
    }
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` takes precedence
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
