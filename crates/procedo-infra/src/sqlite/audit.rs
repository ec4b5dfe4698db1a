//! SQLite integration audit log.

use chrono::{DateTime, Utc};
use procedo_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use crate::executor::integration::audit::{AuditRecord, AuditSink};

/// Persists [`AuditRecord`]s to the `integration_audit` table.
pub struct SqliteAuditSink {
    pool: DatabasePool,
}

impl SqliteAuditSink {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Most recent records for a procedure, newest first.
    pub async fn for_procedure(
        &self,
        procedure: &str,
        limit: i64,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM integration_audit WHERE procedure = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(procedure)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| AuditRow::from_row(row)?.into_record())
            .collect()
    }
}

impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO integration_audit
               (id, procedure, credential, method, url, status, duration_ms, error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.procedure)
        .bind(&record.credential)
        .bind(&record.method)
        .bind(&record.url)
        .bind(record.status.map(i64::from))
        .bind(record.duration_ms as i64)
        .bind(&record.error)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct AuditRow {
    id: String,
    procedure: String,
    credential: Option<String>,
    method: String,
    url: String,
    status: Option<i64>,
    duration_ms: i64,
    error: Option<String>,
    created_at: String,
}

impl AuditRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, RepositoryError> {
        let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());
        Ok(Self {
            id: row.try_get("id").map_err(get)?,
            procedure: row.try_get("procedure").map_err(get)?,
            credential: row.try_get("credential").map_err(get)?,
            method: row.try_get("method").map_err(get)?,
            url: row.try_get("url").map_err(get)?,
            status: row.try_get("status").map_err(get)?,
            duration_ms: row.try_get("duration_ms").map_err(get)?,
            error: row.try_get("error").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }

    fn into_record(self) -> Result<AuditRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid audit id: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?;
        let status = self
            .status
            .map(u16::try_from)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid status: {e}")))?;

        Ok(AuditRecord {
            id,
            procedure: self.procedure,
            credential: self.credential,
            method: self.method,
            url: self.url,
            status,
            duration_ms: self.duration_ms.max(0) as u64,
            error: self.error,
            created_at,
        })
    }
}
