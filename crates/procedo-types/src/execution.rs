//! Execution trace and result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Outcome of a single step attempt as recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Ok,
    Skipped,
    Error,
    Warning,
    Retry,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the append-only execution trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEntry {
    /// Step name (declared name or `<type>#<index>`).
    pub step: String,
    /// Full `category.verb` type.
    pub command_type: String,
    pub status: TraceStatus,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    pub fn new(
        step: impl Into<String>,
        command_type: impl Into<String>,
        status: TraceStatus,
        duration_ms: u64,
    ) -> Self {
        Self {
            step: step.into(),
            command_type: command_type.into(),
            status,
            duration_ms,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of a successful procedure execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Resolved result map; unresolvable entries are `null`.
    pub result: BTreeMap<String, Value>,
    /// Recovered failures of optional steps.
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl ExecutionResult {
    /// Number of trace entries with the given status.
    pub fn count_status(&self, status: TraceStatus) -> usize {
        self.trace.iter().filter(|e| e.status == status).count()
    }
}
