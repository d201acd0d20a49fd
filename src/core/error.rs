use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to connect to {uri}: {reason}")]
    Connection { uri: String, reason: String },

    #[error("Migration '{name}' not found (available: {available})")]
    MigrationNotFound { name: String, available: String },

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Failed to transform {collection} document {id}: {reason}")]
    Transform {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Write to {collection} failed for _id {id}: {reason}")]
    Write {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

impl MigrateError {
    pub fn transform(collection: &str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            collection: collection.to_string(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn write(collection: &str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            collection: collection.to_string(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<mongodb::error::Error> for MigrateError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bson::ser::Error> for MigrateError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Storage(format!("Failed to encode document: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MigrateError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
