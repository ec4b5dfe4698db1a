//! Runs the procedures shipped in `procedures/` against the reference
//! collaborators.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use procedo_core::Engine;
use procedo_infra::credential::{CredentialResolver, CredentialSource};
use procedo_infra::executor::integration::audit::TracingAuditSink;
use procedo_infra::executor::{DataExecutor, IntegrationExecutor, NotificationExecutor};
use procedo_infra::repository::FileProcedureRepository;
use procedo_infra::store::InMemoryRecordStore;
use procedo_types::config::{CredentialConfig, IntegrationSettings};
use procedo_types::execution::TraceStatus;
use secrecy::SecretString;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn procedures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../procedures")
}

struct TestSecret;

impl CredentialSource for TestSecret {
    fn name(&self) -> &'static str {
        "test"
    }

    fn secret(&self, _name: &str, _config: Option<&CredentialConfig>) -> Option<SecretString> {
        Some(SecretString::from("sk_test".to_string()))
    }
}

/// Answer `times` requests with the same canned response.
async fn payments_api(status_line: &'static str, body: &'static str, times: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for _ in 0..times {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if n == 0 || received.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{address}")
}

fn engine(payments_url: &str, store: Arc<InMemoryRecordStore>) -> Engine {
    let mut credentials = BTreeMap::new();
    credentials.insert(
        "payments".to_string(),
        CredentialConfig {
            base_url: payments_url.to_string(),
            header: "Authorization".to_string(),
            scheme: "Bearer".to_string(),
            secret_env: None,
        },
    );
    let integration = IntegrationExecutor::new(
        IntegrationSettings {
            allow_private_networks: true,
            ..IntegrationSettings::default()
        },
        CredentialResolver::with_sources(credentials, vec![Box::new(TestSecret)]),
        Arc::new(TracingAuditSink),
    )
    .unwrap();

    Engine::builder()
        .repository(Arc::new(FileProcedureRepository::new(procedures_dir())))
        .executor(DataExecutor::new(store))
        .executor(integration)
        .executor(NotificationExecutor)
        .build()
        .unwrap()
}

#[test]
fn test_every_sample_procedure_checks_clean() {
    let engine = engine("http://127.0.0.1:9", Arc::new(InMemoryRecordStore::new()));
    let definitions = FileProcedureRepository::new(procedures_dir()).list().unwrap();
    assert!(definitions.len() >= 2);
    for definition in &definitions {
        let problems = engine.check_definition(definition);
        assert!(problems.is_empty(), "{}: {problems:?}", definition.code);
    }
}

#[tokio::test]
async fn test_quote_price_by_tier() {
    let engine = engine("http://127.0.0.1:9", Arc::new(InMemoryRecordStore::new()));

    let gold = engine
        .execute(
            "quote-price",
            json!({ "sku": "A1", "qty": 2, "unit_price": 10, "tier": "gold" }),
        )
        .await
        .unwrap();
    let total = gold.result["total"].as_f64().unwrap();
    assert!((total - 16.0).abs() < 1e-9, "gold total was {total}");
    assert_eq!(gold.result["sku"], json!("A1"));

    let bronze = engine
        .execute(
            "quote-price",
            json!({ "sku": "A1", "qty": 2, "unit_price": 10, "tier": "bronze" }),
        )
        .await
        .unwrap();
    let total = bronze.result["total"].as_f64().unwrap();
    assert!((total - 20.0).abs() < 1e-9, "bronze total was {total}");
}

#[tokio::test]
async fn test_quote_price_rejects_zero_quantity() {
    let engine = engine("http://127.0.0.1:9", Arc::new(InMemoryRecordStore::new()));

    let failure = engine
        .execute(
            "quote-price",
            json!({ "sku": "A1", "qty": 0, "unit_price": 10, "tier": "gold" }),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.error.catch_descriptor().code, "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_place_order_end_to_end() {
    let store = Arc::new(InMemoryRecordStore::new());
    let url = payments_api("HTTP/1.1 201 Created", r#"{"charge":"ch_1"}"#, 1).await;
    let engine = engine(&url, store.clone());

    let result = engine
        .execute(
            "place-order",
            json!({
                "sku": "A1",
                "qty": 2,
                "unit_price": 10,
                "tier": "silver",
                "email": "buyer@example.com"
            }),
        )
        .await
        .unwrap();

    assert!(result.result["order_id"].is_string());
    assert_eq!(store.count("reservations"), 1);
    assert_eq!(store.count("orders"), 1);
    // The notification stub fails, but the step is optional.
    assert_eq!(result.warnings.len(), 1);
    assert!(
        result
            .trace
            .iter()
            .any(|e| e.step == "confirm" && e.status == TraceStatus::Warning)
    );
}

#[tokio::test]
async fn test_place_order_declined_payment_releases_reservation() {
    let store = Arc::new(InMemoryRecordStore::new());
    // One response per retry attempt.
    let url = payments_api("HTTP/1.1 402 Payment Required", r#"{"error":"declined"}"#, 3).await;
    let engine = engine(&url, store.clone());

    let failure = engine
        .execute(
            "place-order",
            json!({ "sku": "A1", "qty": 1, "unit_price": 5, "tier": "gold", "email": "b@example.com" }),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.error.catch_descriptor().code, "PAYMENT_FAILED");
    assert!(failure.rollback_error.is_none());
    assert_eq!(store.count("reservations"), 0);
    assert_eq!(store.count("orders"), 0);
    let retries = failure
        .trace
        .iter()
        .filter(|e| e.status == TraceStatus::Retry)
        .count();
    assert_eq!(retries, 2);
}
