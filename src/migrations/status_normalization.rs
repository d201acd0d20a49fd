use super::Migration;
use crate::core::Result;
use crate::core::value::describe_id;
use crate::engine::{
    BatchCursorProcessor, DocumentVisitor, ExecutionContext, ReadSide, RunCounters,
    build_set_update, collect_matching_paths,
};
use async_trait::async_trait;
use bson::{Bson, Document};
use tracing::{debug, info};

const STATUS_KEY: &str = "status";
const NORMALIZED_STATUS: i32 = 2;

/// Rewrites legacy `status` values (`200` or null) to `2` in every target collection.
pub struct StatusNormalization;

/// Legacy success markers. Only integral 200 counts, whatever its numeric type.
fn is_legacy_status(value: &Bson) -> bool {
    match value {
        Bson::Null => true,
        Bson::Int32(n) => *n == 200,
        Bson::Int64(n) => *n == 200,
        Bson::Double(n) => *n == 200.0,
        _ => false,
    }
}

struct StatusVisitor {
    collection: String,
    matched: u64,
    fields: u64,
}

#[async_trait]
impl DocumentVisitor for StatusVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, document: Document) -> Result<()> {
        let paths = collect_matching_paths(&document, STATUS_KEY, is_legacy_status);
        if paths.is_empty() {
            return Ok(());
        }
        let Some(id) = document.get("_id") else {
            return Ok(());
        };

        self.matched += 1;
        self.fields += paths.len() as u64;
        debug!(
            "Identified status field paths {} in {} for _id={}.",
            paths.join(", "),
            self.collection,
            describe_id(Some(id))
        );

        let update = build_set_update(&paths, &Bson::Int32(NORMALIZED_STATUS));
        ctx.update_existing(&self.collection, id, update).await?;
        Ok(())
    }
}

#[async_trait]
impl Migration for StatusNormalization {
    fn id(&self) -> &'static str {
        "0008-status_normalization"
    }

    fn description(&self) -> &'static str {
        "Normalize status fields across target collections by setting 200/null values to 2."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        let mut counters = RunCounters::new();

        for name in ctx.target.list_collection_names().await? {
            if name.starts_with("system.") {
                debug!("Skipping collection {} during status normalization.", name);
                continue;
            }

            let mut visitor = StatusVisitor {
                collection: name.clone(),
                matched: 0,
                fields: 0,
            };
            let summary = BatchCursorProcessor::new(&name)
                .read_from(ReadSide::Target)
                .run(ctx, &mut visitor)
                .await?;

            counters.add_processed(summary.processed);
            counters.bump("collections_processed");
            if visitor.matched == 0 {
                continue;
            }

            counters.bump("collections_updated");
            counters.add("documents_matched", visitor.matched);
            counters.add("status_fields", visitor.fields);
            counters.add(&format!("{}_documents", name), visitor.matched);

            let verb = if ctx.dry_run { "Would normalize" } else { "Normalized" };
            info!(
                "{} {} documents across {} status field(s) in {}.",
                verb, visitor.matched, visitor.fields, name
            );
        }

        info!(
            "Status normalization complete. Collections processed: {}, collections updated: {}, documents matched: {}, status fields {}: {}.",
            counters.tally("collections_processed"),
            counters.tally("collections_updated"),
            counters.tally("documents_matched"),
            if ctx.dry_run { "identified" } else { "normalized" },
            counters.tally("status_fields")
        );
        Ok(counters)
    }
}
