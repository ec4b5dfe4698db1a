//! Procedure repositories.
//!
//! Both implement `ProcedureRepository` from `procedo-core`:
//! - [`InMemoryProcedureRepository`] -- DashMap-backed, for embedding and tests
//! - [`FileProcedureRepository`] -- one `<code>.yaml` per procedure in a directory

pub mod file;
pub mod memory;

pub use file::FileProcedureRepository;
pub use memory::InMemoryProcedureRepository;
