use crate::core::Result;
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Forward-only stream of documents produced by a `find`.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Query filters the migrations need.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    /// The field exists and is not null.
    Present(String),
}

impl Filter {
    pub fn present(field: impl Into<String>) -> Self {
        Filter::Present(field.into())
    }

    pub fn to_document(&self) -> Document {
        match self {
            Filter::All => Document::new(),
            Filter::Present(field) => doc! { field.as_str(): { "$exists": true, "$ne": Bson::Null } },
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Present(field) => {
                matches!(document.get(field), Some(v) if !matches!(v, Bson::Null | Bson::Undefined))
            }
        }
    }
}

/// Cursor request: filter, optional field projection and server batch size.
#[derive(Debug, Clone)]
pub struct FindSpec {
    pub filter: Filter,
    pub projection: Option<Vec<String>>,
    pub batch_size: u32,
}

impl FindSpec {
    pub fn new(batch_size: u32) -> Self {
        Self {
            filter: Filter::All,
            projection: None,
            batch_size,
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

    pub fn projection_document(&self) -> Option<Document> {
        self.projection.as_ref().map(|fields| {
            fields
                .iter()
                .map(|field| (field.clone(), Bson::Int32(1)))
                .collect()
        })
    }

    /// Applies the projection to a full document; `_id` is always kept and
    /// a dotted field keeps its whole top-level parent.
    pub fn project(&self, document: Document) -> Document {
        match &self.projection {
            None => document,
            Some(fields) => document
                .into_iter()
                .filter(|(key, _)| {
                    key == "_id"
                        || fields
                            .iter()
                            .any(|f| f.split('.').next() == Some(key.as_str()))
                })
                .collect(),
        }
    }
}

/// Result of a single-document write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// One database (namespace) of a document store.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    fn name(&self) -> &str;

    async fn list_collection_names(&self) -> Result<Vec<String>>;

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self
            .list_collection_names()
            .await?
            .iter()
            .any(|name| name == collection))
    }

    /// Opens a cursor. Documents arrive in collection order.
    async fn find(&self, collection: &str, spec: FindSpec) -> Result<DocumentStream>;

    async fn find_by_id(&self, collection: &str, id: &Bson) -> Result<Option<Document>>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// `$set` of `set` on the document with `_id == id`, inserting when `upsert` is on.
    async fn update_set(
        &self,
        collection: &str,
        id: &Bson,
        set: Document,
        upsert: bool,
    ) -> Result<WriteOutcome>;

    /// Full replacement of the document with `_id == id`.
    async fn replace(
        &self,
        collection: &str,
        id: &Bson,
        document: Document,
        upsert: bool,
    ) -> Result<WriteOutcome>;
}

/// An open connection to a store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase>;

    async fn shutdown(&self) -> Result<()>;
}

/// Opens connections from connection strings.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn StoreClient>>;
}
