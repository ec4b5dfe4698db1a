//! Configuration types.
//!
//! `EngineConfig` holds the global limits applied to every top-level
//! execution tree. [`ProcedoConfig`] is the whole of `procedo.toml`: the
//! engine limits under `[engine]`, HTTP integration settings under
//! `[integration]`, and named credentials under `[credentials.<name>]`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global limits for the procedure engine.
///
/// All fields have sensible defaults, so an empty `[engine]` table (or none
/// at all) yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of executed steps across one execution tree.
    #[serde(default = "default_max_commands")]
    pub max_commands: u32,
    /// Maximum number of `integration` steps.
    #[serde(default = "default_max_http_calls")]
    pub max_http_calls: u32,
    /// Maximum number of `notification` steps.
    #[serde(default = "default_max_notifications")]
    pub max_notifications: u32,
    /// Maximum call-stack length, top-level procedure included.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Wall-clock budget for one top-level execution in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Number of compiled expressions kept in the evaluator cache.
    #[serde(default = "default_expression_cache_capacity")]
    pub expression_cache_capacity: usize,
}

fn default_max_commands() -> u32 {
    1000
}

fn default_max_http_calls() -> u32 {
    50
}

fn default_max_notifications() -> u32 {
    20
}

fn default_max_call_depth() -> usize {
    10
}

fn default_execution_timeout_ms() -> u64 {
    30_000
}

fn default_expression_cache_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commands: default_max_commands(),
            max_http_calls: default_max_http_calls(),
            max_notifications: default_max_notifications(),
            max_call_depth: default_max_call_depth(),
            execution_timeout_ms: default_execution_timeout_ms(),
            expression_cache_capacity: default_expression_cache_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// procedo.toml
// ---------------------------------------------------------------------------

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedoConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub integration: IntegrationSettings,
    /// Named credentials referenced by `integration.request` steps.
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialConfig>,
}

/// Settings for outbound HTTP integration calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Allow loopback, private and link-local targets. Off by default.
    #[serde(default)]
    pub allow_private_networks: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "procedo/0.1".to_string()
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            allow_private_networks: false,
            user_agent: default_user_agent(),
        }
    }
}

impl IntegrationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named credential: where to send requests and how to authenticate.
///
/// The secret itself is never stored in the file. It is read from the
/// environment variable named by `secret_env`, or from
/// `PROCEDO_CREDENTIAL_<NAME>` which always takes precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub base_url: String,
    /// Header carrying the secret.
    #[serde(default = "default_auth_header")]
    pub header: String,
    /// Prefix placed before the secret in the header value, e.g. `Bearer`.
    /// Empty means the raw secret.
    #[serde(default = "default_auth_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub secret_env: Option<String>,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}
