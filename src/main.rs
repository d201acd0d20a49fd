mod cli;

use crate::cli::Cli;
use crate::cli::app::App;
use anyhow::{Context, Result};
use clap::Parser;
use docmigrate::storage::MongoConnector;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = load_env();
    let debug = cli.debug || env_flag("DEBUG");

    let outcome = match loaded {
        Ok(()) => {
            init_tracing();
            run(cli).await
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if debug {
                eprintln!("\nMigration failed: {:?}", err);
            } else {
                eprintln!("\nMigration failed: {}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = App::new(Arc::new(MongoConnector))?;
    app.execute(cli.command).await
}

/// Loads `.env`, or the file named by `ENV_PATH`. A missing default file is fine.
fn load_env() -> Result<()> {
    match std::env::var("ENV_PATH") {
        Ok(path) if !path.is_empty() => {
            dotenvy::from_path(&path)
                .with_context(|| format!("Failed to load environment file '{}'", path))?;
        }
        _ => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn env_flag(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("true") | Ok("1"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
