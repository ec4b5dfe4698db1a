//! In-memory procedure repository.

use dashmap::DashMap;
use procedo_core::repository::ProcedureRepository;
use procedo_types::error::RepositoryError;
use procedo_types::procedure::ProcedureDefinition;

/// Published definitions keyed by code. Publishing the same code again
/// replaces the previous definition.
#[derive(Debug, Default)]
pub struct InMemoryProcedureRepository {
    definitions: DashMap<String, ProcedureDefinition>,
}

impl InMemoryProcedureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `definition`, returning the one it replaced.
    pub fn publish(&self, definition: ProcedureDefinition) -> Option<ProcedureDefinition> {
        self.definitions.insert(definition.code.clone(), definition)
    }

    pub fn unpublish(&self, code: &str) -> Option<ProcedureDefinition> {
        self.definitions.remove(code).map(|(_, def)| def)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<ProcedureDefinition> for InMemoryProcedureRepository {
    fn from_iter<I: IntoIterator<Item = ProcedureDefinition>>(iter: I) -> Self {
        let repo = Self::new();
        for def in iter {
            repo.publish(def);
        }
        repo
    }
}

impl ProcedureRepository for InMemoryProcedureRepository {
    async fn get_published_definition(
        &self,
        code: &str,
    ) -> Result<Option<ProcedureDefinition>, RepositoryError> {
        Ok(self.definitions.get(code).map(|entry| entry.value().clone()))
    }
}
