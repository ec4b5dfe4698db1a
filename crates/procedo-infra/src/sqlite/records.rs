//! SQLite record store.
//!
//! Records live in one `records` table keyed by `(table_name, id)` with the
//! fields stored as JSON text. Equality filters are applied after decoding,
//! in id order.

use chrono::Utc;
use procedo_types::error::RepositoryError;
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use crate::store::{ID_FIELD, Record, RecordStore, matches_filter, merge_fields, new_record_id, validate_table};

pub struct SqliteRecordStore {
    pool: DatabasePool,
}

impl SqliteRecordStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load(&self, table: &str, id: &str) -> Result<Option<Record>, RepositoryError> {
        let row = sqlx::query("SELECT id, data FROM records WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(decode_row).transpose()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<Record, RepositoryError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let data: String = row
        .try_get("data")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    let mut record = match serde_json::from_str::<Value>(&data) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(RepositoryError::Query(format!(
                "record {id} is not an object: {other}"
            )));
        }
        Err(e) => return Err(RepositoryError::Query(format!("invalid JSON record {id}: {e}"))),
    };
    record.insert(ID_FIELD.to_string(), Value::String(id));
    Ok(record)
}

fn encode_fields(record: &Record) -> Result<String, RepositoryError> {
    let mut stored = record.clone();
    stored.remove(ID_FIELD);
    serde_json::to_string(&stored)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize record: {e}")))
}

// ---------------------------------------------------------------------------
// RecordStore implementation
// ---------------------------------------------------------------------------

impl RecordStore for SqliteRecordStore {
    async fn create(&self, table: &str, fields: &Record) -> Result<String, RepositoryError> {
        validate_table(table)?;
        let id = new_record_id();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO records (table_name, id, data, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(table)
        .bind(&id)
        .bind(encode_fields(fields)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, fields: &Record) -> Result<u64, RepositoryError> {
        validate_table(table)?;
        let Some(mut record) = self.load(table, id).await? else {
            return Ok(0);
        };
        merge_fields(&mut record, fields);

        let result = sqlx::query(
            "UPDATE records SET data = ?, updated_at = ? WHERE table_name = ? AND id = ?",
        )
        .bind(encode_fields(&record)?)
        .bind(Utc::now().to_rfc3339())
        .bind(table)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<u64, RepositoryError> {
        validate_table(table)?;
        let result = sqlx::query("DELETE FROM records WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, RepositoryError> {
        validate_table(table)?;
        self.load(table, id).await
    }

    async fn query(
        &self,
        table: &str,
        filter: &Record,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, RepositoryError> {
        validate_table(table)?;
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT id, data FROM records WHERE table_name = ? ORDER BY id")
            .bind(table)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::new();
        for row in &rows {
            let record = decode_row(row)?;
            if matches_filter(&record, filter) {
                records.push(record);
                if limit.is_some_and(|limit| records.len() >= limit) {
                    break;
                }
            }
        }
        Ok(records)
    }
}
