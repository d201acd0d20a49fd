pub mod engine;
pub mod memory;
pub mod mongo;

pub use engine::{
    DocumentDatabase, DocumentStream, Filter, FindSpec, StoreClient, StoreConnector, WriteOutcome,
};
pub use memory::{InMemoryConnector, InMemoryDatabase, InMemoryStore};
pub use mongo::{MongoConnector, MongoDatabase};
