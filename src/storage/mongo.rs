//! MongoDB backend built on the official driver.

use super::engine::{
    DocumentDatabase, DocumentStream, FindSpec, StoreClient, StoreConnector, WriteOutcome,
};
use crate::connection::redact_uri;
use crate::core::value::describe_id;
use crate::core::{MigrateError, Result};
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, FindOptions, ReplaceOptions, UpdateOptions};
use mongodb::{Client, Database};
use std::sync::Arc;

pub struct MongoDatabase {
    db: Database,
    name: String,
}

impl MongoDatabase {
    pub fn new(db: Database) -> Self {
        let name = db.name().to_string();
        Self { db, name }
    }

    fn write_error(collection: &str, id: &Bson, err: mongodb::error::Error) -> MigrateError {
        let id = describe_id(Some(id));
        tracing::error!(collection, id = %id, error = %err, "write rejected by server");
        MigrateError::write(collection, id, err.to_string())
    }
}

#[async_trait]
impl DocumentDatabase for MongoDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.db.list_collection_names(None).await?)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let names = self
            .db
            .list_collection_names(doc! { "name": collection })
            .await?;
        Ok(!names.is_empty())
    }

    async fn find(&self, collection: &str, spec: FindSpec) -> Result<DocumentStream> {
        let options = FindOptions::builder()
            .batch_size(spec.batch_size)
            .projection(spec.projection_document())
            .build();
        let cursor = self
            .db
            .collection::<Document>(collection)
            .find(spec.filter.to_document(), options)
            .await?;
        Ok(cursor.map_err(MigrateError::from).boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &Bson) -> Result<Option<Document>> {
        Ok(self
            .db
            .collection::<Document>(collection)
            .find_one(doc! { "_id": id.clone() }, None)
            .await?)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self
            .db
            .collection::<Document>(collection)
            .count_documents(None, None)
            .await?)
    }

    async fn update_set(
        &self,
        collection: &str,
        id: &Bson,
        set: Document,
        upsert: bool,
    ) -> Result<WriteOutcome> {
        let options = UpdateOptions::builder().upsert(upsert).build();
        let result = self
            .db
            .collection::<Document>(collection)
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": set }, options)
            .await
            .map_err(|err| Self::write_error(collection, id, err))?;
        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn replace(
        &self,
        collection: &str,
        id: &Bson,
        document: Document,
        upsert: bool,
    ) -> Result<WriteOutcome> {
        let options = ReplaceOptions::builder().upsert(upsert).build();
        let result = self
            .db
            .collection::<Document>(collection)
            .replace_one(doc! { "_id": id.clone() }, document, options)
            .await
            .map_err(|err| Self::write_error(collection, id, err))?;
        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }
}

pub struct MongoClientHandle {
    client: Client,
}

#[async_trait]
impl StoreClient for MongoClientHandle {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(MongoDatabase::new(self.client.database(name)))
    }

    async fn shutdown(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Connects with the driver and verifies the server answers a `ping`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn StoreClient>> {
        let connection_error = |reason: String| MigrateError::Connection {
            uri: redact_uri(uri),
            reason,
        };

        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| connection_error(e.to_string()))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| connection_error(format!("ping failed: {}", e)))?;

        tracing::info!(uri = %redact_uri(uri), "connected");
        Ok(Arc::new(MongoClientHandle { client }))
    }
}
