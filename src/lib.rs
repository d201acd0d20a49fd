// ============================================================================
// docmigrate library
// ============================================================================

pub mod connection;
pub mod core;
pub mod engine;
pub mod migrations;
pub mod runner;
pub mod storage;

pub use connection::{ConfigOverrides, ConnectionManager, Connections, MigrationConfig};
pub use core::{MigrateError, Result};
pub use engine::{ExecutionContext, RunCounters};
pub use migrations::{Migration, MigrationRegistry};
pub use runner::{MigrationRunner, RunReport, RunState};
