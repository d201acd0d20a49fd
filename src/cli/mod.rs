pub mod app;

use clap::{Parser, Subcommand};
use docmigrate::connection::ConfigOverrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docmigrate")]
#[command(about = "Run batched MongoDB document migrations")]
#[command(version)]
pub struct Cli {
    /// Print the full error chain on failure (also enabled by DEBUG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered migrations in execution order
    List {
        #[arg(long)]
        migrations_dir: Option<PathBuf>,
    },
    /// Run a single migration by id
    Run {
        /// Migration id, e.g. 0001-auth
        name: String,
        #[arg(long)]
        source_uri: Option<String>,
        #[arg(long)]
        target_uri: Option<String>,
        #[arg(long)]
        source_db: Option<String>,
        #[arg(long)]
        target_db: Option<String>,
        #[arg(long)]
        batch_size: Option<u32>,
        /// Log intended writes without performing them
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        dry_run: Option<bool>,
        #[arg(long)]
        migrations_dir: Option<PathBuf>,
    },
}

impl Command {
    /// Flag values that take precedence over the environment.
    pub fn overrides(&self) -> ConfigOverrides {
        match self {
            Command::List { migrations_dir } => ConfigOverrides {
                migrations_dir: migrations_dir.clone(),
                ..ConfigOverrides::default()
            },
            Command::Run {
                source_uri,
                target_uri,
                source_db,
                target_db,
                batch_size,
                dry_run,
                migrations_dir,
                ..
            } => ConfigOverrides {
                source_uri: source_uri.clone(),
                target_uri: target_uri.clone(),
                source_db: source_db.clone(),
                target_db: target_db.clone(),
                batch_size: *batch_size,
                dry_run: *dry_run,
                migrations_dir: migrations_dir.clone(),
            },
        }
    }
}
