pub mod error;
pub mod path;
pub mod value;

pub use error::{MigrateError, Result};
