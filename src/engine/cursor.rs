//! Batched, forward-only pass over one collection.

use super::context::ExecutionContext;
use crate::core::Result;
use crate::storage::{Filter, FindSpec};
use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use tracing::info;

/// Per-document step of a cursor pass.
#[async_trait]
pub trait DocumentVisitor: Send {
    async fn visit(&mut self, ctx: &ExecutionContext, document: Document) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadSide {
    #[default]
    Source,
    Target,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorSummary {
    pub processed: u64,
    /// Processed totals at which a progress line was logged.
    pub progress_marks: Vec<u64>,
}

pub struct BatchCursorProcessor {
    collection: String,
    filter: Filter,
    projection: Option<Vec<String>>,
    side: ReadSide,
}

impl BatchCursorProcessor {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filter: Filter::All,
            projection: None,
            side: ReadSide::Source,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn read_from(mut self, side: ReadSide) -> Self {
        self.side = side;
        self
    }

    /// Streams the collection in batches of `ctx.batch_size`, calling the
    /// visitor once per document. The first error stops the pass.
    pub async fn run(
        self,
        ctx: &ExecutionContext,
        visitor: &mut dyn DocumentVisitor,
    ) -> Result<CursorSummary> {
        let batch_size = ctx.batch_size.max(1);
        let db = match self.side {
            ReadSide::Source => ctx.source.clone(),
            ReadSide::Target => ctx.target.clone(),
        };

        let mut spec = FindSpec::new(batch_size).filter(self.filter);
        spec.projection = self.projection;
        let mut cursor = db.find(&self.collection, spec).await?;

        let mut summary = CursorSummary::default();
        while let Some(document) = cursor.try_next().await? {
            visitor.visit(ctx, document).await?;
            summary.processed += 1;
            if summary.processed % u64::from(batch_size) == 0 {
                info!("Processed {} {} documents", summary.processed, self.collection);
                summary.progress_marks.push(summary.processed);
            }
        }

        if summary.processed % u64::from(batch_size) != 0 {
            info!("Processed {} {} documents", summary.processed, self.collection);
            summary.progress_marks.push(summary.processed);
        }
        Ok(summary)
    }
}
