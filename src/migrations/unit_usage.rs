use super::Migration;
use crate::core::value::describe_id;
use crate::core::{MigrateError, Result};
use crate::engine::{BatchCursorProcessor, DocumentVisitor, ExecutionContext, RunCounters};
use async_trait::async_trait;
use bson::Document;
use tracing::{debug, info};

const COLLECTION: &str = "unit_usage";
const REMOVED_FIELDS: &[&str] = &["collectionRef"];

/// Copies `unit_usage`, dropping the fields the new schema no longer carries.
pub struct UnitUsageCopy;

struct StripVisitor {
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for StripVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, mut document: Document) -> Result<()> {
        let id = document
            .get("_id")
            .cloned()
            .ok_or_else(|| MigrateError::transform(COLLECTION, describe_id(None), "missing _id"))?;

        let mut removed = Vec::new();
        for field in REMOVED_FIELDS {
            if document.remove(*field).is_some() {
                removed.push(*field);
                self.counters.bump(&format!("removed_{}", field));
            }
        }
        if !removed.is_empty() {
            debug!("removing {} from {}", removed.join(", "), describe_id(Some(&id)));
        }

        ctx.upsert(&mut self.counters, COLLECTION, &id, document).await
    }
}

#[async_trait]
impl Migration for UnitUsageCopy {
    fn id(&self) -> &'static str {
        "0002-unit_usage"
    }

    fn description(&self) -> &'static str {
        "Copy unit_usage collection documents while dropping collectionRef."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        info!("Starting unit_usage migration (removing collectionRef)");

        let mut visitor = StripVisitor {
            counters: RunCounters::new(),
        };
        let summary = BatchCursorProcessor::new(COLLECTION)
            .run(ctx, &mut visitor)
            .await?;

        let mut counters = visitor.counters;
        counters.add_processed(summary.processed);
        info!(
            "Finished unit_usage migration. Processed {} documents. Removed collectionRef from {} documents.",
            counters.processed(),
            counters.tally("removed_collectionRef")
        );
        Ok(counters)
    }
}
