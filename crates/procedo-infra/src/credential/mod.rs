//! Credential resolution for integration calls.
//!
//! A credential is named in a step (`credential: billing`) and resolved to a
//! base URL plus an authentication header. The base URL and header shape
//! come from `[credentials.<name>]` in `procedo.toml`; the secret comes from
//! the first source in the chain that has it:
//! 1. `PROCEDO_CREDENTIAL_<NAME>` ([`EnvCredentialSource`])
//! 2. the variable named by the entry's `secret_env` ([`ConfigCredentialSource`])

pub mod chain;
pub mod source;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub use chain::CredentialResolver;
pub use source::{ConfigCredentialSource, CredentialSource, EnvCredentialSource};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("unknown credential '{0}'")]
    Unknown(String),

    #[error("no secret available for credential '{0}'")]
    MissingSecret(String),
}

/// A resolved credential. The secret stays wrapped until the header is
/// built and never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub name: String,
    pub base_url: String,
    pub header: String,
    pub scheme: String,
    pub secret: SecretString,
}

impl Credential {
    /// Header value: `"<scheme> <secret>"`, or the bare secret when the
    /// scheme is empty.
    pub fn header_value(&self) -> String {
        if self.scheme.is_empty() {
            self.secret.expose_secret().to_string()
        } else {
            format!("{} {}", self.scheme, self.secret.expose_secret())
        }
    }
}
