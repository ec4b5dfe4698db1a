//! Shared domain types for Procedo.
//!
//! This crate contains the serializable types shared by the engine, the
//! reference collaborators and the CLI: procedure definitions and commands,
//! execution traces and results, engine configuration, and the error types
//! that cross crate boundaries.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, thiserror.

pub mod config;
pub mod error;
pub mod execution;
pub mod procedure;
