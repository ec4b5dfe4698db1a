//! Procedure definition lookup.
//!
//! Follows the blanket-impl pattern used for every async port:
//! 1. `ProcedureRepository` uses native async fn in traits (RPITIT)
//! 2. The object-safe `ProcedureRepositoryDyn` returns boxed futures
//! 3. A blanket impl bridges the two, so `Arc<dyn ProcedureRepositoryDyn>`
//!    works for any implementation

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use procedo_types::error::RepositoryError;
use procedo_types::procedure::ProcedureDefinition;

/// Read access to published procedure definitions.
pub trait ProcedureRepository: Send + Sync {
    /// Fetch the published definition for `code`, or `None` if there is none.
    fn get_published_definition(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<ProcedureDefinition>, RepositoryError>> + Send;
}

/// Object-safe version of [`ProcedureRepository`] with boxed futures.
pub trait ProcedureRepositoryDyn: Send + Sync {
    fn get_published_definition_boxed<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProcedureDefinition>, RepositoryError>> + Send + 'a>>;
}

/// Blanket implementation: any `ProcedureRepository` is usable as a trait object.
impl<T: ProcedureRepository> ProcedureRepositoryDyn for T {
    fn get_published_definition_boxed<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProcedureDefinition>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.get_published_definition(code))
    }
}

/// Type-erased, shareable procedure repository.
pub type DynProcedureRepository = Arc<dyn ProcedureRepositoryDyn>;
