//! Drives one migration: connect, run, report, disconnect.

use crate::connection::{ConnectionManager, MigrationConfig};
use crate::core::Result;
use crate::engine::{ExecutionContext, RunCounters};
use crate::migrations::Migration;
use crate::storage::StoreConnector;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ConnectionsOpening,
    Running,
    ConnectionsClosing,
    Completed,
    Failed,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub migration_id: String,
    pub dry_run: bool,
    pub counters: RunCounters,
    pub states: Vec<RunState>,
}

pub struct MigrationRunner {
    connector: Arc<dyn StoreConnector>,
    states: Vec<RunState>,
}

impl MigrationRunner {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            states: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    /// States visited by the last run, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.states
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state(), to = ?next, "runner state");
        self.states.push(next);
    }

    /// Runs `migration`. Connections are closed whether or not it succeeds.
    pub async fn run(
        &mut self,
        migration: Arc<dyn Migration>,
        config: MigrationConfig,
    ) -> Result<RunReport> {
        self.states = vec![RunState::Idle];
        if let Err(err) = config.validate() {
            self.transition(RunState::Failed);
            return Err(err);
        }

        self.transition(RunState::ConnectionsOpening);
        let connections = match ConnectionManager::new(self.connector.clone()).open(&config).await {
            Ok(connections) => connections,
            Err(err) => {
                self.transition(RunState::Failed);
                return Err(err);
            }
        };

        let config = Arc::new(config);
        let span = info_span!("migration", id = migration.id());
        let ctx = ExecutionContext::new(
            connections.source.clone(),
            connections.target.clone(),
            config.clone(),
            span.clone(),
        );

        self.transition(RunState::Running);
        let outcome = async {
            if ctx.dry_run {
                warn!("Running in dry-run mode. No target writes will be persisted.");
            }
            info!("Starting migration");
            let counters = migration.up(&ctx).await?;
            info!(summary = %counters, "Migration finished successfully");
            Ok::<_, crate::core::MigrateError>(counters)
        }
        .instrument(span)
        .await;
        drop(ctx);

        self.transition(RunState::ConnectionsClosing);
        connections.close().await;

        match outcome {
            Ok(counters) => {
                self.transition(RunState::Completed);
                Ok(RunReport {
                    migration_id: migration.id().to_string(),
                    dry_run: config.dry_run,
                    counters,
                    states: self.states.clone(),
                })
            }
            Err(err) => {
                error!(migration = migration.id(), error = %err, "migration failed");
                self.transition(RunState::Failed);
                Err(err)
            }
        }
    }
}
