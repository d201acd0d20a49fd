use super::Migration;
use crate::core::{MigrateError, Result};
use crate::core::value::describe_id;
use crate::engine::{BatchCursorProcessor, DocumentVisitor, ExecutionContext, RunCounters};
use async_trait::async_trait;
use bson::Document;
use tracing::info;

const COLLECTION: &str = "auth";

/// Copies `auth` unchanged.
pub struct AuthCopy;

struct CopyVisitor {
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for CopyVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, document: Document) -> Result<()> {
        let id = document
            .get("_id")
            .cloned()
            .ok_or_else(|| MigrateError::transform(COLLECTION, describe_id(None), "missing _id"))?;
        ctx.upsert(&mut self.counters, COLLECTION, &id, document).await
    }
}

#[async_trait]
impl Migration for AuthCopy {
    fn id(&self) -> &'static str {
        "0001-auth"
    }

    fn description(&self) -> &'static str {
        "Copy auth collection documents from source to target without modification."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        info!("Starting auth collection copy");

        let mut visitor = CopyVisitor {
            counters: RunCounters::new(),
        };
        let summary = BatchCursorProcessor::new(COLLECTION)
            .run(ctx, &mut visitor)
            .await?;

        let mut counters = visitor.counters;
        counters.add_processed(summary.processed);
        info!("Finished auth collection copy. Total processed: {}", counters.processed());
        Ok(counters)
    }
}
