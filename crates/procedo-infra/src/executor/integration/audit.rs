//! Audit trail for outbound integration calls.
//!
//! Every request that reaches the network produces one [`AuditRecord`],
//! whatever its outcome. Sinks must never see secrets; records carry the
//! credential name only.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use procedo_types::error::RepositoryError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Procedure whose step made the call.
    pub procedure: String,
    pub credential: Option<String>,
    pub method: String,
    pub url: String,
    /// HTTP status, absent when no response was received.
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sink port
// ---------------------------------------------------------------------------

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Object-safe version of [`AuditSink`] with boxed futures.
pub trait AuditSinkDyn: Send + Sync {
    fn record_boxed<'a>(
        &'a self,
        record: &'a AuditRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;
}

impl<T: AuditSink> AuditSinkDyn for T {
    fn record_boxed<'a>(
        &'a self,
        record: &'a AuditRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.record(record))
    }
}

pub type DynAuditSink = Arc<dyn AuditSinkDyn>;

// ---------------------------------------------------------------------------
// Tracing sink
// ---------------------------------------------------------------------------

/// Writes audit records as structured `info` events on the
/// `procedo::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        tracing::info!(
            target: "procedo::audit",
            id = %record.id,
            procedure = %record.procedure,
            credential = record.credential.as_deref().unwrap_or("-"),
            method = %record.method,
            url = %record.url,
            status = record.status,
            duration_ms = record.duration_ms,
            error = record.error.as_deref(),
            "integration call"
        );
        Ok(())
    }
}
