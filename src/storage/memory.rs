use super::engine::{
    DocumentDatabase, DocumentStream, FindSpec, StoreClient, StoreConnector, WriteOutcome,
};
use crate::core::path::set_path;
use crate::core::{MigrateError, Result};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Insertion-ordered collection with an `_id` position index.
#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    documents: Vec<Document>,
    positions: HashMap<String, usize>,
}

impl MemoryCollection {
    fn position(&self, id: &Bson) -> Option<usize> {
        self.positions.get(&id_key(id)).copied()
    }

    fn push(&mut self, document: Document) {
        let key = document.get("_id").map(id_key).unwrap_or_default();
        self.positions.insert(key, self.documents.len());
        self.documents.push(document);
    }
}

fn id_key(id: &Bson) -> String {
    id.clone().into_canonical_extjson().to_string()
}

type Databases = HashMap<String, HashMap<String, MemoryCollection>>;

/// Process-local document store.
///
/// Clones share the same data, so a test can seed a store, hand it to the
/// runner through [`InMemoryConnector`] and inspect the result afterwards.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    databases: Arc<RwLock<Databases>>,
    shutdowns: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_handle(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(InMemoryDatabase {
            store: self.clone(),
            name: name.to_string(),
        })
    }

    /// Seeds documents, assigning an ObjectId to any document without `_id`.
    pub fn insert_many<I>(&self, database: &str, collection: &str, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut databases = self.databases.write()?;
        let target = databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            let duplicate = document
                .get("_id")
                .filter(|id| target.position(id).is_some());
            if let Some(id) = duplicate {
                return Err(MigrateError::Storage(format!(
                    "Duplicate _id {} in {}.{}",
                    id, database, collection
                )));
            }
            target.push(document);
        }
        Ok(())
    }

    /// Creates an empty collection so it shows up in listings.
    pub fn create_collection(&self, database: &str, collection: &str) -> Result<()> {
        let mut databases = self.databases.write()?;
        databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    /// Snapshot of a collection in insertion order.
    pub fn documents(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let databases = self.databases.read()?;
        Ok(databases
            .get(database)
            .and_then(|db| db.get(collection))
            .map(|c| c.documents.clone())
            .unwrap_or_default())
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        self.database_handle(name)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct InMemoryDatabase {
    store: InMemoryStore,
    name: String,
}

impl InMemoryDatabase {
    fn with_collection_mut<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut MemoryCollection) -> Result<T>,
    ) -> Result<T> {
        let mut databases = self.store.databases.write()?;
        let target = databases
            .entry(self.name.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        f(target)
    }
}

#[async_trait]
impl DocumentDatabase for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let databases = self.store.databases.read()?;
        let mut names: Vec<String> = databases
            .get(&self.name)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn find(&self, collection: &str, spec: FindSpec) -> Result<DocumentStream> {
        let matching: Vec<Document> = {
            let databases = self.store.databases.read()?;
            databases
                .get(&self.name)
                .and_then(|db| db.get(collection))
                .map(|c| {
                    c.documents
                        .iter()
                        .filter(|document| spec.filter.matches(document))
                        .map(|document| spec.project(document.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(stream::iter(matching.into_iter().map(Ok)).boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &Bson) -> Result<Option<Document>> {
        let databases = self.store.databases.read()?;
        Ok(databases
            .get(&self.name)
            .and_then(|db| db.get(collection))
            .and_then(|c| c.position(id).map(|pos| c.documents[pos].clone())))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let databases = self.store.databases.read()?;
        Ok(databases
            .get(&self.name)
            .and_then(|db| db.get(collection))
            .map(|c| c.documents.len() as u64)
            .unwrap_or(0))
    }

    async fn update_set(
        &self,
        collection: &str,
        id: &Bson,
        set: Document,
        upsert: bool,
    ) -> Result<WriteOutcome> {
        self.with_collection_mut(collection, |target| match target.position(id) {
            Some(pos) => {
                let mut changed = false;
                for (path, value) in set {
                    changed |= set_path(&mut target.documents[pos], &path, value)?;
                }
                Ok(WriteOutcome {
                    matched: 1,
                    modified: u64::from(changed),
                    upserted: false,
                })
            }
            None if upsert => {
                let mut document = Document::new();
                document.insert("_id", id.clone());
                for (path, value) in set {
                    set_path(&mut document, &path, value)?;
                }
                target.push(document);
                Ok(WriteOutcome {
                    matched: 0,
                    modified: 0,
                    upserted: true,
                })
            }
            None => Ok(WriteOutcome::default()),
        })
    }

    async fn replace(
        &self,
        collection: &str,
        id: &Bson,
        mut document: Document,
        upsert: bool,
    ) -> Result<WriteOutcome> {
        document.insert("_id", id.clone());
        self.with_collection_mut(collection, |target| match target.position(id) {
            Some(pos) => {
                let changed = target.documents[pos] != document;
                target.documents[pos] = document;
                Ok(WriteOutcome {
                    matched: 1,
                    modified: u64::from(changed),
                    upserted: false,
                })
            }
            None if upsert => {
                target.push(document);
                Ok(WriteOutcome {
                    matched: 0,
                    modified: 0,
                    upserted: true,
                })
            }
            None => Ok(WriteOutcome::default()),
        })
    }
}

/// Hands out clients backed by one shared [`InMemoryStore`] per URI.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    stores: Arc<RwLock<HashMap<String, InMemoryStore>>>,
    connects: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` as the endpoint for `uri`.
    pub fn with_store(self, uri: &str, store: InMemoryStore) -> Self {
        if let Ok(mut stores) = self.stores.write() {
            stores.insert(uri.to_string(), store);
        }
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn StoreClient>> {
        let store = self
            .stores
            .read()?
            .get(uri)
            .cloned()
            .ok_or_else(|| MigrateError::Connection {
                uri: crate::connection::redact_uri(uri),
                reason: "no in-memory store registered for this URI".to_string(),
            })?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Filter;
    use bson::doc;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_upsert_then_update() {
        let store = InMemoryStore::new();
        let db = store.database_handle("app");
        let id = Bson::Int32(1);

        let first = db
            .update_set("users", &id, doc! { "name": "Ann" }, true)
            .await
            .unwrap();
        assert!(first.upserted);

        let second = db
            .update_set("users", &id, doc! { "name": "Ann" }, true)
            .await
            .unwrap();
        assert_eq!(second, WriteOutcome { matched: 1, modified: 0, upserted: false });

        let missing = db
            .update_set("users", &Bson::Int32(2), doc! { "name": "Bob" }, false)
            .await
            .unwrap();
        assert_eq!(missing.matched, 0);
        assert_eq!(db.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_with_filter_and_projection() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "app",
                "reports",
                vec![
                    doc! { "_id": 1, "payload": { "a": 1 }, "other": true },
                    doc! { "_id": 2, "payload": Bson::Null },
                    doc! { "_id": 3 },
                ],
            )
            .unwrap();
        let db = store.database_handle("app");

        let spec = FindSpec::new(10)
            .filter(Filter::present("payload"))
            .projection(["payload"]);
        let found: Vec<Document> = db
            .find("reports", spec)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": 1, "payload": { "a": 1 } }]);
    }

    #[tokio::test]
    async fn test_replace_overwrites_whole_document() {
        let store = InMemoryStore::new();
        store
            .insert_many("app", "c", vec![doc! { "_id": "x", "a": 1, "b": 2 }])
            .unwrap();
        let db = store.database_handle("app");
        db.replace("c", &Bson::String("x".into()), doc! { "a": 5 }, true)
            .await
            .unwrap();
        assert_eq!(
            store.documents("app", "c").unwrap(),
            vec![doc! { "a": 5, "_id": "x" }]
        );
    }
}
