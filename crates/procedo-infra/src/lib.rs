//! Infrastructure layer for Procedo.
//!
//! Reference implementations of the ports defined in `procedo-core` and the
//! leaf executors that talk to the outside world: procedure repositories
//! (YAML directory, in-memory), record stores (in-memory, SQLite), the HTTP
//! integration executor with its credential chain and audit sinks, and the
//! `procedo.toml` loader.

pub mod config;
pub mod credential;
pub mod executor;
pub mod repository;
pub mod sqlite;
pub mod store;
