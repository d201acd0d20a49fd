use super::counters::RunCounters;
use super::sink::{DryRunSink, LiveSink, WriteSink};
use crate::connection::MigrationConfig;
use crate::core::Result;
use crate::storage::DocumentDatabase;
use bson::{Bson, Document};
use std::sync::Arc;
use tracing::Span;

/// Everything a migration needs for one run. Built by the runner and
/// handed to `Migration::up` by reference.
pub struct ExecutionContext {
    pub source: Arc<dyn DocumentDatabase>,
    pub target: Arc<dyn DocumentDatabase>,
    pub batch_size: u32,
    pub dry_run: bool,
    pub span: Span,
    pub config: Arc<MigrationConfig>,
    sink: Arc<dyn WriteSink>,
}

impl ExecutionContext {
    /// Picks the live or dry-run sink from `config.dry_run`.
    pub fn new(
        source: Arc<dyn DocumentDatabase>,
        target: Arc<dyn DocumentDatabase>,
        config: Arc<MigrationConfig>,
        span: Span,
    ) -> Self {
        let sink: Arc<dyn WriteSink> = if config.dry_run {
            Arc::new(DryRunSink::new(target.clone()))
        } else {
            Arc::new(LiveSink::new(target.clone()))
        };
        Self {
            source,
            target,
            batch_size: config.batch_size,
            dry_run: config.dry_run,
            span,
            config,
            sink,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn WriteSink>) -> Self {
        self.dry_run = sink.is_dry_run();
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> &dyn WriteSink {
        self.sink.as_ref()
    }

    pub async fn upsert(
        &self,
        counters: &mut RunCounters,
        collection: &str,
        id: &Bson,
        document: Document,
    ) -> Result<()> {
        self.sink.upsert(collection, id, document).await?;
        counters.record_upsert(collection);
        Ok(())
    }

    pub async fn replace(
        &self,
        counters: &mut RunCounters,
        collection: &str,
        id: &Bson,
        document: Document,
    ) -> Result<()> {
        self.sink.replace(collection, id, document).await?;
        counters.record_upsert(collection);
        Ok(())
    }

    pub async fn update_existing(&self, collection: &str, id: &Bson, set: Document) -> Result<bool> {
        self.sink.update_existing(collection, id, set).await
    }
}
