//! YAML-directory procedure repository.
//!
//! Every file `<code>.yaml` (or `<code>.yml`) directly under the root
//! directory is a published procedure. Files are read on every lookup, so
//! edits are picked up without a restart.

use std::path::{Path, PathBuf};

use procedo_core::procedure::definition::{discover_procedures, parse_procedure_yaml};
use procedo_core::repository::ProcedureRepository;
use procedo_types::error::RepositoryError;
use procedo_types::procedure::ProcedureDefinition;

#[derive(Debug, Clone)]
pub struct FileProcedureRepository {
    root: PathBuf,
}

impl FileProcedureRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every valid definition in the directory, sorted by code. Invalid
    /// files are skipped.
    pub fn list(&self) -> Result<Vec<ProcedureDefinition>, RepositoryError> {
        discover_procedures(&self.root)
            .map(|found| found.into_iter().map(|(_, def)| def).collect())
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn read_candidate(&self, code: &str) -> Result<Option<String>, RepositoryError> {
        for extension in ["yaml", "yml"] {
            let path = self.root.join(format!("{code}.{extension}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return Ok(Some(content)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(RepositoryError::Connection(format!(
                        "failed to read {}: {err}",
                        path.display()
                    )));
                }
            }
        }
        Ok(None)
    }
}

/// Codes map straight onto file names, so only the characters a valid code
/// may contain are accepted.
fn is_lookup_safe(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ProcedureRepository for FileProcedureRepository {
    async fn get_published_definition(
        &self,
        code: &str,
    ) -> Result<Option<ProcedureDefinition>, RepositoryError> {
        if !is_lookup_safe(code) {
            return Ok(None);
        }
        let Some(content) = self.read_candidate(code).await? else {
            return Ok(None);
        };

        let def = parse_procedure_yaml(&content).map_err(|e| RepositoryError::InvalidDefinition {
            code: code.to_string(),
            reason: e.to_string(),
        })?;
        if def.code != code {
            return Err(RepositoryError::InvalidDefinition {
                code: code.to_string(),
                reason: format!("file declares code '{}'", def.code),
            });
        }
        tracing::debug!(code, commands = def.commands.len(), "loaded procedure from file");
        Ok(Some(def))
    }
}
