//! Data store access for the e-commerce dataset
//!
//! The pipeline only sees the `DataStore` / `StoreConnection` traits. SQLite
//! is the bundled implementation; `loader` builds it from the CSV exports.

pub mod format;
pub mod loader;
pub mod schema;
pub mod store;

pub use format::format_table;
pub use loader::{initialize_database, verify_database, LoadOutcome, CSV_TABLES};
pub use schema::SCHEMA_DEFINITION;
pub use store::{
    ConnectionGuard, DataStore, SqliteStore, StatementInterrupt, StatementOutput, StoreConnection,
};
