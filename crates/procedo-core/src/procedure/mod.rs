//! Procedure definitions: YAML parsing, structural validation, and
//! filesystem load/save/discovery.

pub mod definition;
