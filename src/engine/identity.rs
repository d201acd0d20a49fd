//! Deterministic secondary identifiers.
//!
//! When one source document is split into several target documents, each
//! derived document needs an `_id` that is stable across reruns so that
//! upserts stay idempotent. ObjectId-shaped bases get the offset added to
//! their last byte; anything else is hashed.

use crate::core::value::{stringify, to_object_id};
use bson::Bson;
use bson::oid::ObjectId;
use sha1::{Digest, Sha1};

/// Role of a document derived from a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedRole {
    Insight,
    Report,
}

impl DerivedRole {
    pub fn offset(self) -> u8 {
        match self {
            DerivedRole::Insight => 1,
            DerivedRole::Report => 2,
        }
    }
}

/// Derives the identifier for `base` shifted by `offset`.
pub fn derive_object_id(base: &Bson, offset: u8) -> ObjectId {
    if let Some(oid) = to_object_id(base) {
        let mut bytes = oid.bytes();
        bytes[11] = bytes[11].wrapping_add(offset);
        return ObjectId::from_bytes(bytes);
    }

    let mut hasher = Sha1::new();
    hasher.update(stringify(base).as_bytes());
    hasher.update(offset.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&digest[..12]);
    ObjectId::from_bytes(bytes)
}

pub fn derive_for_role(base: &Bson, role: DerivedRole) -> ObjectId {
    derive_object_id(base, role.offset())
}
