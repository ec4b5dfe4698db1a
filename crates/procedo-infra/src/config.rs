//! Configuration loader.
//!
//! Reads `procedo.toml` from a directory and deserializes it into
//! [`ProcedoConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::Path;

use procedo_types::config::ProcedoConfig;

/// File name looked up inside the configuration directory.
pub const CONFIG_FILE: &str = "procedo.toml";

/// Load configuration from `{dir}/procedo.toml`.
///
/// - Missing file: defaults, logged at debug.
/// - Unreadable or unparseable file: defaults, logged as a warning.
pub async fn load_config(dir: &Path) -> ProcedoConfig {
    let config_path = dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return ProcedoConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ProcedoConfig::default();
        }
    };

    match toml::from_str::<ProcedoConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            ProcedoConfig::default()
        }
    }
}
