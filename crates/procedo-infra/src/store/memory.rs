//! In-memory record store.

use std::collections::BTreeMap;

use dashmap::DashMap;
use procedo_types::error::RepositoryError;
use serde_json::Value;

use super::{ID_FIELD, Record, RecordStore, matches_filter, merge_fields, new_record_id, validate_table};

/// Tables of records held in process memory. Ids sort in creation order.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: DashMap<String, BTreeMap<String, Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn create(&self, table: &str, fields: &Record) -> Result<String, RepositoryError> {
        validate_table(table)?;
        let id = new_record_id();
        let mut record = Record::new();
        merge_fields(&mut record, fields);
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), record);
        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, fields: &Record) -> Result<u64, RepositoryError> {
        validate_table(table)?;
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(0);
        };
        match rows.get_mut(id) {
            Some(record) => {
                merge_fields(record, fields);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, table: &str, id: &str) -> Result<u64, RepositoryError> {
        validate_table(table)?;
        let removed = self
            .tables
            .get_mut(table)
            .and_then(|mut rows| rows.remove(id));
        Ok(u64::from(removed.is_some()))
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, RepositoryError> {
        validate_table(table)?;
        Ok(self
            .tables
            .get(table)
            .and_then(|rows| rows.get(id).cloned()))
    }

    async fn query(
        &self,
        table: &str,
        filter: &Record,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, RepositoryError> {
        validate_table(table)?;
        let Some(rows) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|record| matches_filter(record, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
