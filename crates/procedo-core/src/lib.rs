//! Procedure execution engine and repository trait definitions for Procedo.
//!
//! This crate holds the engine (dispatch, per-step policy, limits, retry,
//! saga rollback, flow control) and defines the "ports" the infrastructure
//! layer implements: procedure lookup and leaf command executors. It depends
//! only on `procedo-types` -- never on `procedo-infra` or any database/IO crate.

pub mod engine;
pub mod expression;
pub mod procedure;
pub mod repository;

pub use engine::{Engine, EngineBuilder, ExecutionOptions};
