use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code used for structured failures raised by `check.fail` without a code.
pub const DEFAULT_FAILURE_CODE: &str = "PROCEDURE_FAILED";

/// Code used for failed `check.validate` conditions without a code.
pub const VALIDATION_FAILURE_CODE: &str = "VALIDATION_FAILED";

/// Code exposed to a catch block for any error that was not raised as a
/// structured procedure failure.
pub const EXECUTION_ERROR_CODE: &str = "EXECUTION_ERROR";

/// A structured, user-facing failure with a stable code.
///
/// This is what a catch block sees under the `error` variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ProcedureFailure {
    pub code: String,
    pub message: String,
}

impl ProcedureFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors from repository operations (used by trait definitions in procedo-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid definition '{code}': {reason}")]
    InvalidDefinition { code: String, reason: String },
}
