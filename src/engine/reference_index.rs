//! In-memory lookup from loose external references to canonical identifiers.
//!
//! Older documents point at each other through whatever field happened to
//! be in use at the time (`projectId`, `project_id`, `collectionRef.id`, ...)
//! and with whatever type the writer chose. The index normalizes every
//! candidate value to a string key so that lookups do not care which form
//! was used.

use crate::core::Result;
use crate::core::path::get_path;
use crate::core::value::{number_to_string, to_object_id};
use crate::storage::{DocumentDatabase, FindSpec};
use bson::{Bson, Document};
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Normalizes a reference value to its lookup key.
///
/// Identifiers (ObjectId, 24-hex strings, `{ "$oid": .. }`) map to lowercase
/// hex, containers with an `id` member map to that member's key, numbers to
/// their decimal form and other non-blank text to itself.
pub fn normalize_reference(value: &Bson) -> Option<String> {
    match value {
        Bson::Null | Bson::Undefined => None,
        Bson::Document(doc) if doc.contains_key("id") => doc.get("id").and_then(normalize_reference),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => match value {
            Bson::Int32(n) => Some(n.to_string()),
            Bson::Int64(n) => Some(n.to_string()),
            Bson::Double(n) if n.is_finite() => Some(number_to_string(*n)),
            _ => None,
        },
        Bson::String(text) => match to_object_id(value) {
            Some(oid) => Some(oid.to_hex()),
            None if !text.trim().is_empty() => Some(text.clone()),
            None => None,
        },
        other => to_object_id(other).map(|oid| oid.to_hex()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    map: HashMap<String, Bson>,
    ids: HashSet<String>,
    records: u64,
    available: bool,
}

impl ReferenceIndex {
    /// Index used when the auxiliary collection does not exist.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Builds an index over already fetched records.
    pub fn from_documents<'a, I>(documents: I, fields: &[&str]) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut index = Self {
            available: true,
            ..Self::default()
        };
        for document in documents {
            index.insert_record(document, fields);
        }
        index
    }

    fn insert_record(&mut self, document: &Document, fields: &[&str]) {
        self.records += 1;
        let Some(id) = document.get("_id") else {
            return;
        };
        if let Some(hex) = to_object_id(id).map(|oid| oid.to_hex()) {
            self.ids.insert(hex);
        }
        for field in fields {
            let Some(key) = get_path(document, field).and_then(normalize_reference) else {
                continue;
            };
            self.map.entry(key).or_insert_with(|| id.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.map.get(key)
    }

    /// First hit among `candidates`, tried in order.
    pub fn resolve<'a, I>(&self, candidates: I) -> Option<&Bson>
    where
        I: IntoIterator<Item = &'a Bson>,
    {
        candidates
            .into_iter()
            .filter_map(normalize_reference)
            .find_map(|key| self.map.get(&key))
    }

    /// Whether `hex` is the identifier of an indexed record.
    pub fn contains_id(&self, hex: &str) -> bool {
        self.ids.contains(hex)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }
}

/// Pre-pass over an auxiliary collection.
#[derive(Debug, Clone)]
pub struct ReferenceIndexBuilder {
    collection: String,
    fields: Vec<String>,
    batch_size: u32,
}

impl ReferenceIndexBuilder {
    pub fn new(collection: &str, batch_size: u32) -> Self {
        Self {
            collection: collection.to_string(),
            fields: Vec::new(),
            batch_size,
        }
    }

    /// Candidate reference fields, in the order they are indexed.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Scans the collection. A missing collection gives an unavailable,
    /// empty index and a warning.
    pub async fn build(&self, db: &dyn DocumentDatabase) -> Result<ReferenceIndex> {
        if !db.collection_exists(&self.collection).await? {
            warn!(
                collection = %self.collection,
                "auxiliary collection not found; references will not be resolved"
            );
            return Ok(ReferenceIndex::unavailable());
        }

        let spec = FindSpec::new(self.batch_size).projection(self.fields.iter().cloned());
        let mut cursor = db.find(&self.collection, spec).await?;
        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();

        let mut index = ReferenceIndex {
            available: true,
            ..ReferenceIndex::default()
        };
        while let Some(document) = cursor.try_next().await? {
            index.insert_record(&document, &fields);
        }

        info!(
            "Indexed {} {} documents for reference lookups ({} keys).",
            index.record_count(),
            self.collection,
            index.len()
        );
        Ok(index)
    }
}
