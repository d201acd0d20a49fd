//! Recursive search for fields by name anywhere in a document tree.

use crate::core::path::join_path;
use bson::{Bson, Document};
use std::collections::HashSet;

/// Collects the dotted root-relative paths of every field whose key equals
/// `name` (ignoring case) and whose value satisfies `predicate`. Array
/// indices are path segments. Paths are unique and in discovery order.
pub fn collect_matching_paths<P>(document: &Document, name: &str, predicate: P) -> Vec<String>
where
    P: Fn(&Bson) -> bool,
{
    let mut walker = PathWalker {
        name: name.to_lowercase(),
        predicate,
        segments: Vec::new(),
        seen: HashSet::new(),
        found: Vec::new(),
    };
    walker.walk_document(document);
    walker.found
}

struct PathWalker<P> {
    name: String,
    predicate: P,
    segments: Vec<String>,
    seen: HashSet<String>,
    found: Vec<String>,
}

impl<P> PathWalker<P>
where
    P: Fn(&Bson) -> bool,
{
    fn walk_document(&mut self, document: &Document) {
        for (key, value) in document {
            self.segments.push(key.clone());
            if key.to_lowercase() == self.name && (self.predicate)(value) {
                let path = join_path(&self.segments);
                if self.seen.insert(path.clone()) {
                    self.found.push(path);
                }
            }
            self.walk_value(value);
            self.segments.pop();
        }
    }

    fn walk_value(&mut self, value: &Bson) {
        match value {
            Bson::Document(doc) => self.walk_document(doc),
            Bson::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.segments.push(index.to_string());
                    self.walk_value(item);
                    self.segments.pop();
                }
            }
            _ => {}
        }
    }
}

/// Flat `$set` document assigning `value` to every path.
pub fn build_set_update(paths: &[String], value: &Bson) -> Document {
    paths
        .iter()
        .map(|path| (path.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::{get_path, set_path};
    use bson::doc;

    fn is_legacy_status(value: &Bson) -> bool {
        matches!(value, Bson::Null | Bson::Int32(200))
    }

    #[test]
    fn test_finds_nested_and_array_paths() {
        let document = doc! {
            "a": { "status": 200 },
            "b": [ { "status": Bson::Null }, { "status": 5 } ],
        };
        let paths = collect_matching_paths(&document, "status", is_legacy_status);
        assert_eq!(paths, vec!["a.status".to_string(), "b.0.status".to_string()]);
    }

    #[test]
    fn test_rewrite_leaves_non_matching_values() {
        let mut document = doc! {
            "a": { "status": 200 },
            "b": [ { "status": Bson::Null }, { "status": 5 } ],
        };
        let paths = collect_matching_paths(&document, "status", is_legacy_status);
        let update = build_set_update(&paths, &Bson::Int32(2));
        for (path, value) in update {
            set_path(&mut document, &path, value).unwrap();
        }

        assert_eq!(get_path(&document, "a.status"), Some(&Bson::Int32(2)));
        assert_eq!(get_path(&document, "b.0.status"), Some(&Bson::Int32(2)));
        assert_eq!(get_path(&document, "b.1.status"), Some(&Bson::Int32(5)));
    }

    #[test]
    fn test_key_match_is_case_insensitive() {
        let document = doc! { "Status": 200, "inner": { "STATUS": Bson::Null } };
        let paths = collect_matching_paths(&document, "status", is_legacy_status);
        assert_eq!(paths, vec!["Status".to_string(), "inner.STATUS".to_string()]);
    }

    #[test]
    fn test_matching_value_is_still_descended() {
        let document = doc! { "status": { "status": 200 } };
        let paths = collect_matching_paths(&document, "status", |v| !matches!(v, Bson::Int32(1)));
        assert_eq!(paths, vec!["status".to_string(), "status.status".to_string()]);
    }

    #[test]
    fn test_no_matches() {
        let document = doc! { "state": 200, "list": [1, 2, 3] };
        assert!(collect_matching_paths(&document, "status", is_legacy_status).is_empty());
    }
}
