//! `integration` executor: one outbound HTTP call per step.
//!
//! `integration.request` parameters (all may be `=`-expressions):
//! - `credential` -- named credential; supplies the base URL and auth header
//! - `path` -- joined onto the credential's base URL
//! - `url` -- absolute URL, used when no credential is named
//! - `method` -- defaults to `GET`
//! - `headers` -- object of header values
//! - `body` -- strings are sent as text, anything else as JSON
//!
//! The step result is `{status, headers, body}` with `body` parsed as JSON
//! when possible. A non-2xx status fails the step. Redirects are not
//! followed, so the target check cannot be bypassed by a `Location` header.

pub mod audit;
pub mod guard;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use procedo_core::Engine;
use procedo_core::engine::executor::{command_verb, unknown_verb};
use procedo_core::engine::{BoxFuture, CommandExecutor, EngineError, ExecutionContext};
use procedo_types::config::IntegrationSettings;
use procedo_types::procedure::Command;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use self::audit::{AuditRecord, DynAuditSink};
use super::{object_param, resolve_param, string_param};
use crate::credential::{Credential, CredentialError, CredentialResolver};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("URL scheme '{0}' is not allowed")]
    SchemeNotAllowed(String),

    #[error("target '{host}' resolves to internal address {address}")]
    BlockedAddress { host: String, address: IpAddr },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("{0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<IntegrationError> for EngineError {
    fn from(error: IntegrationError) -> Self {
        EngineError::failed(error.to_string())
    }
}

pub struct IntegrationExecutor {
    client: reqwest::Client,
    settings: IntegrationSettings,
    credentials: CredentialResolver,
    audit: DynAuditSink,
}

/// A fully resolved request, ready to send.
struct PreparedRequest {
    method: reqwest::Method,
    url: String,
    credential: Option<Credential>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

impl IntegrationExecutor {
    pub fn new(
        settings: IntegrationSettings,
        credentials: CredentialResolver,
        audit: DynAuditSink,
    ) -> Result<Self, IntegrationError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none());
        if !settings.allow_private_networks {
            builder = builder.dns_resolver(Arc::new(guard::GuardedResolver));
        }
        let client = builder
            .build()
            .map_err(|e| IntegrationError::Client(e.to_string()))?;

        Ok(Self {
            client,
            settings,
            credentials,
            audit,
        })
    }

    fn prepare(
        &self,
        command: &Command,
        ctx: &ExecutionContext,
        engine: &Engine,
    ) -> Result<PreparedRequest, EngineError> {
        let method_text = string_param(engine, command, "method", ctx)?
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase();
        let method: reqwest::Method = method_text
            .parse()
            .map_err(|_| EngineError::failed(format!("invalid HTTP method: {method_text}")))?;

        let credential = match string_param(engine, command, "credential", ctx)? {
            Some(name) => Some(
                self.credentials
                    .resolve(&name)
                    .map_err(IntegrationError::from)?,
            ),
            None => None,
        };

        let url = match &credential {
            Some(credential) => {
                let path = string_param(engine, command, "path", ctx)?.unwrap_or_default();
                join_url(&credential.base_url, &path)
            }
            None => string_param(engine, command, "url", ctx)?.ok_or_else(|| {
                EngineError::malformed(format!(
                    "'{}' requires 'credential' or 'url'",
                    command.command_type
                ))
            })?,
        };

        let mut headers = BTreeMap::new();
        for (name, value) in object_param(engine, command, "headers", ctx)? {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            headers.insert(name, value);
        }

        Ok(PreparedRequest {
            method,
            url,
            credential,
            headers,
            body: resolve_param(engine, command, "body", ctx)?,
        })
    }

    async fn send(
        &self,
        prepared: PreparedRequest,
        ctx: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let url = guard::check_target(&prepared.url, self.settings.allow_private_networks).await?;

        let mut request = self
            .client
            .request(prepared.method.clone(), url.clone())
            .timeout(self.request_timeout(ctx));
        for (name, value) in &prepared.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(credential) = &prepared.credential {
            request = request.header(credential.header.as_str(), credential.header_value());
        }
        request = match &prepared.body {
            Some(Value::String(text)) => request.body(text.clone()),
            Some(body) => request.json(body),
            None => request,
        };

        let started = Instant::now();
        let outcome = request.send().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut audit = AuditRecord {
            id: Uuid::now_v7(),
            procedure: ctx.current_procedure().to_string(),
            credential: prepared.credential.as_ref().map(|c| c.name.clone()),
            method: prepared.method.to_string(),
            url: url.to_string(),
            status: None,
            duration_ms,
            error: None,
            created_at: Utc::now(),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                let message = format!("HTTP request to '{url}' failed: {e}");
                audit.error = Some(message.clone());
                self.write_audit(&audit).await;
                return Err(EngineError::failed(message));
            }
        };

        let status = response.status();
        audit.status = Some(status.as_u16());
        let response_headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    Value::String(v.to_str().unwrap_or("<binary>").to_string()),
                )
            })
            .collect();
        let text = response.text().await.unwrap_or_default();
        let body = parse_body(&text);

        if !status.is_success() {
            audit.error = Some(format!("HTTP {status}"));
            self.write_audit(&audit).await;
            return Err(EngineError::failed(format!(
                "HTTP {} from {} {url}",
                status.as_u16(),
                prepared.method
            )));
        }
        self.write_audit(&audit).await;

        tracing::info!(
            method = %prepared.method,
            url = %url,
            status = status.as_u16(),
            duration_ms,
            "integration request completed"
        );

        Ok(json!({
            "status": status.as_u16(),
            "headers": response_headers,
            "body": body,
        }))
    }

    /// Configured timeout, capped by what is left of the execution deadline.
    fn request_timeout(&self, ctx: &ExecutionContext) -> Duration {
        let remaining = ctx.deadline().saturating_duration_since(Instant::now());
        self.settings.timeout().min(remaining.max(Duration::from_millis(1)))
    }

    async fn write_audit(&self, record: &AuditRecord) {
        if let Err(e) = self.audit.record_boxed(record).await {
            tracing::warn!(error = %e, url = %record.url, "failed to write integration audit record");
        }
    }
}

impl CommandExecutor for IntegrationExecutor {
    fn category(&self) -> &str {
        "integration"
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        ctx: &'a mut ExecutionContext,
        engine: &'a Engine,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(async move {
            if command_verb(command)? != "request" {
                return Err(unknown_verb(command));
            }
            let prepared = self.prepare(command, ctx, engine)?;
            if ctx.is_dry_run() {
                return Ok(json!({
                    "dry_run": true,
                    "method": prepared.method.as_str(),
                    "url": prepared.url,
                }));
            }
            self.send(prepared, ctx).await
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
