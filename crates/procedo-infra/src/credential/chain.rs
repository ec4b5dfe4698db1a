//! Credential chain: configured entries plus secret sources in priority
//! order.

use std::collections::BTreeMap;

use procedo_types::config::CredentialConfig;

use super::source::{ConfigCredentialSource, CredentialSource, EnvCredentialSource};
use super::{Credential, CredentialError};

pub struct CredentialResolver {
    configs: BTreeMap<String, CredentialConfig>,
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialResolver {
    /// Resolver with the default chain: environment override first, then the
    /// entry's `secret_env`.
    pub fn new(configs: BTreeMap<String, CredentialConfig>) -> Self {
        Self::with_sources(
            configs,
            vec![Box::new(EnvCredentialSource), Box::new(ConfigCredentialSource)],
        )
    }

    pub fn with_sources(
        configs: BTreeMap<String, CredentialConfig>,
        sources: Vec<Box<dyn CredentialSource>>,
    ) -> Self {
        Self { configs, sources }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// Resolve `name` to a full credential. The name must be configured
    /// and some source must supply a secret.
    pub fn resolve(&self, name: &str) -> Result<Credential, CredentialError> {
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| CredentialError::Unknown(name.to_string()))?;

        for source in &self.sources {
            if let Some(secret) = source.secret(name, Some(config)) {
                tracing::debug!(credential = name, source = source.name(), "credential resolved");
                return Ok(Credential {
                    name: name.to_string(),
                    base_url: config.base_url.clone(),
                    header: config.header.clone(),
                    scheme: config.scheme.clone(),
                    secret,
                });
            }
        }
        Err(CredentialError::MissingSecret(name.to_string()))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<_> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("CredentialResolver")
            .field("credentials", &self.configs.keys().collect::<Vec<_>>())
            .field("sources", &sources)
            .finish()
    }
}
