//! Dotted field paths (`a.b.0.c`) where numeric segments index into arrays.

use super::{MigrateError, Result};
use bson::{Bson, Document};

pub fn join_path(segments: &[String]) -> String {
    segments.join(".")
}

/// Reads the value at `path`, following array indices.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path` the way a `$set` does: missing intermediate
/// documents are created, arrays are padded with nulls up to the index.
/// Returns whether the stored value changed.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<bool> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(MigrateError::Storage(format!("Invalid field path '{}'", path)));
    }
    set_in_document(document, &segments, value, path)
}

fn set_in_document(doc: &mut Document, segments: &[&str], value: Bson, path: &str) -> Result<bool> {
    let (head, rest) = segments
        .split_first()
        .ok_or_else(|| MigrateError::Storage(format!("Invalid field path '{}'", path)))?;

    if rest.is_empty() {
        let changed = doc.get(*head) != Some(&value);
        doc.insert(*head, value);
        return Ok(changed);
    }

    if !doc.contains_key(*head) {
        doc.insert(*head, Document::new());
    }
    match doc.get_mut(*head) {
        Some(child) => set_in_value(child, rest, value, path),
        None => Err(MigrateError::Storage(format!("Invalid field path '{}'", path))),
    }
}

fn set_in_value(node: &mut Bson, segments: &[&str], value: Bson, path: &str) -> Result<bool> {
    match node {
        Bson::Document(doc) => set_in_document(doc, segments, value, path),
        Bson::Array(items) => {
            let (head, rest) = segments
                .split_first()
                .ok_or_else(|| MigrateError::Storage(format!("Invalid field path '{}'", path)))?;
            let index = head.parse::<usize>().map_err(|_| {
                MigrateError::Storage(format!(
                    "Cannot use non-numeric segment '{}' on an array in '{}'",
                    head, path
                ))
            })?;
            while items.len() <= index {
                items.push(if rest.is_empty() {
                    Bson::Null
                } else {
                    Bson::Document(Document::new())
                });
            }
            if rest.is_empty() {
                let changed = items[index] != value;
                items[index] = value;
                Ok(changed)
            } else {
                set_in_value(&mut items[index], rest, value, path)
            }
        }
        _ => Err(MigrateError::Storage(format!(
            "Cannot create field in '{}': parent is not a document or array",
            path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_set_nested_array_element() {
        let mut document = doc! { "b": [ { "status": Bson::Null }, { "status": 5 } ] };
        assert!(set_path(&mut document, "b.0.status", Bson::Int32(2)).unwrap());
        assert_eq!(get_path(&document, "b.0.status"), Some(&Bson::Int32(2)));
        assert_eq!(get_path(&document, "b.1.status"), Some(&Bson::Int32(5)));
    }

    #[test]
    fn test_set_creates_intermediate_documents() {
        let mut document = doc! {};
        set_path(&mut document, "a.b.c", Bson::Boolean(true)).unwrap();
        assert_eq!(document, doc! { "a": { "b": { "c": true } } });
    }

    #[test]
    fn test_set_reports_unchanged_value() {
        let mut document = doc! { "status": 2 };
        assert!(!set_path(&mut document, "status", Bson::Int32(2)).unwrap());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut document = doc! { "a": 1 };
        assert!(set_path(&mut document, "a.b", Bson::Int32(2)).is_err());
        assert!(set_path(&mut document, "a..b", Bson::Int32(2)).is_err());
    }
}
