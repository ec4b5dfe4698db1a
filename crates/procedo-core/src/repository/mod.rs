//! Repository trait definitions (ports).
//!
//! These traits define the lookup interface that the infrastructure layer
//! (procedo-infra) implements. The core crate never depends on any specific
//! storage technology.

pub mod procedure;

pub use procedure::{DynProcedureRepository, ProcedureRepository, ProcedureRepositoryDyn};
