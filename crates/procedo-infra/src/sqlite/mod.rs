//! SQLite storage layer.
//!
//! Record store and integration audit log backed by SQLite with WAL mode
//! and split read/write connection pools.

pub mod audit;
pub mod pool;
pub mod records;

pub use audit::SqliteAuditSink;
pub use pool::DatabasePool;
pub use records::SqliteRecordStore;
