//! Storage layer
//!
//! - **SQLite**: folders, documents, versions and permission grants
//! - **Adapters**: document bytes (`blob`), behind the `StorageAdapter` trait
//!
//! The schema owns the active-only views; `rows` owns the column lists and
//! row readers every other module goes through.

pub mod blob;
pub mod error;
pub(crate) mod rows;
pub mod schema;

pub use blob::{LocalFileStorage, MemoryStorage, StorageAdapter, HOLDING_DIR};
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
