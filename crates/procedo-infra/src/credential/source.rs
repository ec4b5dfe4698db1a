//! Secret sources consulted by the credential chain.
//!
//! Both sources are read-only views over environment variables; they differ
//! only in which variable name they derive for a credential.

use procedo_types::config::CredentialConfig;
use secrecy::SecretString;

/// Prefix of the per-credential override variable.
pub const CREDENTIAL_ENV_PREFIX: &str = "PROCEDO_CREDENTIAL_";

/// One link of the credential chain.
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The secret for credential `name`, if this source has one.
    fn secret(&self, name: &str, config: Option<&CredentialConfig>) -> Option<SecretString>;
}

/// `PROCEDO_CREDENTIAL_<NAME>`, with the name upper-cased and `-`/`.`
/// mapped to `_`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    pub fn variable_for(name: &str) -> String {
        let normalized: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{CREDENTIAL_ENV_PREFIX}{normalized}")
    }
}

impl CredentialSource for EnvCredentialSource {
    fn name(&self) -> &'static str {
        "env"
    }

    fn secret(&self, name: &str, _config: Option<&CredentialConfig>) -> Option<SecretString> {
        read_env(&Self::variable_for(name))
    }
}

/// The variable named by the credential's `secret_env` setting.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigCredentialSource;

impl CredentialSource for ConfigCredentialSource {
    fn name(&self) -> &'static str {
        "config"
    }

    fn secret(&self, _name: &str, config: Option<&CredentialConfig>) -> Option<SecretString> {
        config
            .and_then(|c| c.secret_env.as_deref())
            .and_then(read_env)
    }
}

/// Non-Unicode and empty values count as absent.
fn read_env(variable: &str) -> Option<SecretString> {
    match std::env::var(variable) {
        Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
        _ => None,
    }
}
