//! Record store port backing the `data` command category.
//!
//! A record is a JSON object stored under `(table, id)`. Stores assign ids
//! (UUID v7, so creation order and id order agree) and expose the id as
//! the `id` field of every record they return.

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use procedo_types::error::RepositoryError;
use serde_json::{Map, Value};

pub use memory::InMemoryRecordStore;

/// Field under which a record's id is returned.
pub const ID_FIELD: &str = "id";

pub type Record = Map<String, Value>;

/// CRUD and equality-filter queries over JSON records.
pub trait RecordStore: Send + Sync {
    /// Insert a record and return its new id. An `id` in `fields` is ignored.
    fn create(
        &self,
        table: &str,
        fields: &Record,
    ) -> impl Future<Output = Result<String, RepositoryError>> + Send;

    /// Merge `fields` into an existing record. Returns the number of rows
    /// changed (0 or 1).
    fn update(
        &self,
        table: &str,
        id: &str,
        fields: &Record,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Returns the number of rows removed (0 or 1).
    fn delete(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    fn get(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Record>, RepositoryError>> + Send;

    /// Records whose fields equal every entry of `filter`, in id order,
    /// truncated to `limit` when given.
    fn query(
        &self,
        table: &str,
        filter: &Record,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Record>, RepositoryError>> + Send;
}

impl<S: RecordStore> RecordStore for Arc<S> {
    fn create(
        &self,
        table: &str,
        fields: &Record,
    ) -> impl Future<Output = Result<String, RepositoryError>> + Send {
        (**self).create(table, fields)
    }

    fn update(
        &self,
        table: &str,
        id: &str,
        fields: &Record,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send {
        (**self).update(table, id, fields)
    }

    fn delete(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send {
        (**self).delete(table, id)
    }

    fn get(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Record>, RepositoryError>> + Send {
        (**self).get(table, id)
    }

    fn query(
        &self,
        table: &str,
        filter: &Record,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Record>, RepositoryError>> + Send {
        (**self).query(table, filter, limit)
    }
}

/// Whether `record` matches an equality filter.
pub fn matches_filter(record: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

/// Merge `fields` into `record`, never overwriting the id.
pub fn merge_fields(record: &mut Record, fields: &Record) {
    for (key, value) in fields {
        if key != ID_FIELD {
            record.insert(key.clone(), value.clone());
        }
    }
}

/// Table names are restricted so every backend can use them verbatim.
pub fn validate_table(table: &str) -> Result<(), RepositoryError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::Query(format!("invalid table name '{table}'")))
    }
}

pub fn new_record_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
