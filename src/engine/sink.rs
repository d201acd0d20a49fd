//! Idempotent writes keyed by `_id`, with a dry-run twin that only logs.

use crate::core::Result;
use crate::core::value::describe_id;
use crate::storage::{DocumentDatabase, WriteOutcome};
use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait WriteSink: Send + Sync {
    fn is_dry_run(&self) -> bool;

    /// `$set` of `document` (minus `_id`) on `id`, inserting when absent.
    async fn upsert(&self, collection: &str, id: &Bson, document: Document) -> Result<()>;

    /// Full replacement of the document at `id`, inserting when absent.
    async fn replace(&self, collection: &str, id: &Bson, document: Document) -> Result<()>;

    /// `$set` on an existing document only. Returns whether one matched.
    async fn update_existing(&self, collection: &str, id: &Bson, set: Document) -> Result<bool>;
}

fn without_id(mut document: Document) -> Document {
    document.remove("_id");
    document
}

/// Writes to the target database.
pub struct LiveSink {
    target: Arc<dyn DocumentDatabase>,
}

impl LiveSink {
    pub fn new(target: Arc<dyn DocumentDatabase>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl WriteSink for LiveSink {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn upsert(&self, collection: &str, id: &Bson, document: Document) -> Result<()> {
        self.target
            .update_set(collection, id, without_id(document), true)
            .await?;
        Ok(())
    }

    async fn replace(&self, collection: &str, id: &Bson, document: Document) -> Result<()> {
        self.target.replace(collection, id, document, true).await?;
        Ok(())
    }

    async fn update_existing(&self, collection: &str, id: &Bson, set: Document) -> Result<bool> {
        let WriteOutcome { matched, .. } = self.target.update_set(collection, id, set, false).await?;
        Ok(matched > 0)
    }
}

/// Logs the writes a live run would perform. Reads are still allowed so
/// that link counts agree with a live run.
pub struct DryRunSink {
    target: Arc<dyn DocumentDatabase>,
}

impl DryRunSink {
    pub fn new(target: Arc<dyn DocumentDatabase>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl WriteSink for DryRunSink {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn upsert(&self, collection: &str, id: &Bson, _document: Document) -> Result<()> {
        info!("(dry run) would upsert {} document {}", collection, describe_id(Some(id)));
        Ok(())
    }

    async fn replace(&self, collection: &str, id: &Bson, _document: Document) -> Result<()> {
        info!("(dry run) would replace {} document {}", collection, describe_id(Some(id)));
        Ok(())
    }

    async fn update_existing(&self, collection: &str, id: &Bson, set: Document) -> Result<bool> {
        let fields: Vec<&str> = set.keys().map(String::as_str).collect();
        let exists = self.target.find_by_id(collection, id).await?.is_some();
        if exists {
            info!(
                "(dry run) would set {} on {} document {}",
                fields.join(", "),
                collection,
                describe_id(Some(id))
            );
        } else {
            warn!(
                "(dry run) no {} document {} to update",
                collection,
                describe_id(Some(id))
            );
        }
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use bson::doc;

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let store = InMemoryStore::new();
        store
            .insert_many("target", "folders", vec![doc! { "_id": 1 }])
            .unwrap();
        let sink = DryRunSink::new(store.database_handle("target"));

        sink.upsert("reports", &Bson::Int32(7), doc! { "a": 1 }).await.unwrap();
        sink.replace("reports", &Bson::Int32(8), doc! { "a": 1 }).await.unwrap();
        let linked = sink
            .update_existing("folders", &Bson::Int32(1), doc! { "link": 2 })
            .await
            .unwrap();
        let missing = sink
            .update_existing("folders", &Bson::Int32(2), doc! { "link": 2 })
            .await
            .unwrap();

        assert!(linked);
        assert!(!missing);
        assert!(store.documents("target", "reports").unwrap().is_empty());
        assert_eq!(store.documents("target", "folders").unwrap(), vec![doc! { "_id": 1 }]);
    }

    #[tokio::test]
    async fn test_live_upsert_strips_id_from_set() {
        let store = InMemoryStore::new();
        let sink = LiveSink::new(store.database_handle("target"));
        let id = Bson::String("r-1".into());

        sink.upsert("reports", &id, doc! { "_id": "r-1", "title": "t" })
            .await
            .unwrap();
        assert_eq!(
            store.documents("target", "reports").unwrap(),
            vec![doc! { "_id": "r-1", "title": "t" }]
        );
        assert!(
            !sink
                .update_existing("reports", &Bson::String("nope".into()), doc! { "x": 1 })
                .await
                .unwrap()
        );
    }
}
