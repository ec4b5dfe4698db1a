//! Compiled-program cache shared by all concurrent executions.
//!
//! Reads vastly outnumber writes (the same guards run on every execution),
//! so the map sits behind a `RwLock`: hits take the shared lock, misses
//! compile outside any lock and insert under the exclusive lock. Two callers
//! racing on the same miss may both compile; the first insert wins and the
//! second result is discarded.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{CompiledExpression, ExpressionError};

/// Bounded map from expression text to compiled program.
///
/// Once `capacity` entries are cached, further programs are still compiled
/// and returned but no longer stored.
pub struct ProgramCache {
    capacity: usize,
    entries: RwLock<HashMap<String, Arc<CompiledExpression>>>,
}

impl ProgramCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached program for `text`, compiling it on a miss.
    pub fn get_or_compile<F>(
        &self,
        text: &str,
        compile: F,
    ) -> Result<Arc<CompiledExpression>, ExpressionError>
    where
        F: FnOnce(&str) -> Result<CompiledExpression, ExpressionError>,
    {
        if let Some(hit) = self.get(text) {
            return Ok(hit);
        }

        let program = Arc::new(compile(text)?);

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = entries.get(text) {
            return Ok(Arc::clone(existing));
        }
        if entries.len() < self.capacity {
            entries.insert(text.to_string(), Arc::clone(&program));
        }
        Ok(program)
    }

    pub fn get(&self, text: &str) -> Option<Arc<CompiledExpression>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(text).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
