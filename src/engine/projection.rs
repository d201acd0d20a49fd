//! Building blocks for projecting legacy documents into new record shapes.

use crate::core::value::{is_empty_value, is_truthy};
use bson::{Bson, Document};
use serde::Serialize;

/// First key that is present, even when it holds null.
pub fn first_defined<'a>(document: &'a Document, keys: &[&str]) -> Option<&'a Bson> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .find(|value| !matches!(value, Bson::Undefined))
}

/// First key holding a non-null value.
pub fn first_present<'a>(document: &'a Document, keys: &[&str]) -> Option<&'a Bson> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .find(|value| !matches!(value, Bson::Null | Bson::Undefined))
}

/// First key holding a truthy value.
pub fn first_truthy<'a>(document: &'a Document, keys: &[&str]) -> Option<&'a Bson> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .find(|value| is_truthy(value))
}

/// First non-null value among already looked-up candidates.
pub fn coalesce<'a, I>(candidates: I) -> Option<&'a Bson>
where
    I: IntoIterator<Item = Option<&'a Bson>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|value| !matches!(value, Bson::Null | Bson::Undefined))
}

/// First truthy value among already looked-up candidates.
pub fn coalesce_truthy<'a, I>(candidates: I) -> Option<&'a Bson>
where
    I: IntoIterator<Item = Option<&'a Bson>>,
{
    candidates.into_iter().flatten().find(|value| is_truthy(value))
}

/// Shallow copy of `document` without the `excluded` keys.
pub fn copy_except(document: &Document, excluded: &[&str]) -> Document {
    document
        .iter()
        .filter(|(key, _)| !excluded.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Drops null members.
pub fn prune_nulls(document: Document) -> Document {
    document
        .into_iter()
        .filter(|(_, value)| !matches!(value, Bson::Null | Bson::Undefined))
        .collect()
}

/// `Some` only when the value is not empty.
pub fn non_empty(value: Bson) -> Option<Bson> {
    (!is_empty_value(&value)).then_some(value)
}

/// Sub-document grouping a processing stage's `status`, `data` and `message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Section {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Bson>,
    #[serde(flatten)]
    pub extra: Document,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.data.is_none() && self.message.is_none() && self.extra.is_empty()
    }

    /// A section whose `data` is an object always carries `status` and
    /// `message`, null when the source had neither.
    pub fn apply_defaults(&mut self) {
        if matches!(self.data, Some(Bson::Document(_))) {
            self.status.get_or_insert(Bson::Null);
            self.message.get_or_insert(Bson::Null);
        }
    }

    /// `None` for an empty section, otherwise the section with defaults applied.
    pub fn finish(mut self) -> Option<Self> {
        if self.is_empty() {
            return None;
        }
        self.apply_defaults();
        Some(self)
    }

    pub fn into_bson(self) -> Bson {
        let mut document = Document::new();
        if let Some(status) = self.status {
            document.insert("status", status);
        }
        if let Some(data) = self.data {
            document.insert("data", data);
        }
        if let Some(message) = self.message {
            document.insert("message", message);
        }
        document.extend(self.extra);
        Bson::Document(document)
    }
}
