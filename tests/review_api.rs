//! Serves the review API on an ephemeral port and drives it over HTTP.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use kir::api::{create_router, server_config, AppState};
use kir::config::ServerTlsConfig;
use kir::domain::Rule;
use kir::policy::DecisionEngine;
use kir::storage::{MemoryStore, RuleStore};
use serde_json::{json, Value};

async fn spawn_server(store: Arc<MemoryStore>) -> SocketAddr {
    let engine = DecisionEngine::with_regex(store);
    let app = create_router(Arc::new(AppState::new(engine)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn review(namespace: &str, images: &[&str], annotations: Value) -> Value {
    json!({
        "kind": "ImageReview",
        "apiVersion": "imagepolicy.k8s.io/v1alpha1",
        "spec": {
            "containers": images.iter().map(|image| json!({ "image": image })).collect::<Vec<_>>(),
            "annotations": annotations,
            "namespace": namespace,
        }
    })
}

async fn post_review(addr: SocketAddr, body: &Value) -> (reqwest::StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/review", addr))
        .json(body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_first_matching_rule_by_name_decides() {
    let store = Arc::new(MemoryStore::with_rules([
        Rule::new("b-allow", "^prod-", vec!["^registry.local/".to_string()])
            .with_decision(true, "internal registry"),
        Rule::new("a-deny", "^prod-", vec![":latest$".to_string()])
            .with_decision(false, "latest tag is not allowed"),
    ]));
    let addr = spawn_server(store).await;

    let (status, json) = post_review(
        addr,
        &review("prod-eu", &["registry.local/web:latest"], json!({})),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(json["status"]["allowed"], false);
    assert_eq!(json["status"]["reason"], "latest tag is not allowed");

    let (_, json) = post_review(
        addr,
        &review("prod-eu", &["registry.local/web:1.2"], json!({})),
    )
    .await;
    assert_eq!(json["status"]["allowed"], true);
    assert_eq!(json["kind"], "ImageReview");
}

#[tokio::test]
async fn test_rule_changes_apply_to_next_review() {
    let store = Arc::new(MemoryStore::new());
    let addr = spawn_server(store.clone()).await;
    let body = review("default", &["nginx:1.21"], json!({ "team": "web" }));

    let (_, json) = post_review(addr, &body).await;
    assert_eq!(json["status"]["allowed"], false);
    assert_eq!(json["status"]["reason"], "no matching rule");

    let rule = Rule::new("nginx", "^default$", vec![r"^nginx:1\.".to_string()])
        .with_annotation("^team$", "^web$")
        .with_decision(true, "web team nginx");
    store.add(&rule, false).await.unwrap();

    let (_, json) = post_review(addr, &body).await;
    assert_eq!(json["status"]["allowed"], true);
    assert_eq!(json["status"]["reason"], "web team nginx");

    store.delete("nginx").await.unwrap();

    let (_, json) = post_review(addr, &body).await;
    assert_eq!(json["status"]["allowed"], false);
}

#[tokio::test]
async fn test_malformed_envelope_is_bad_request() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/review", addr))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let json: Value = response.json().await.unwrap();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_unreachable_store_returns_no_decision() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let addr = spawn_server(store).await;

    let (status, json) = post_review(addr, &review("default", &["nginx:1.21"], json!({}))).await;

    assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json.get("status").is_none());

    let ready = reqwest::get(format!("http://{}/ready", addr)).await.unwrap();
    assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_reports_version() {
    let addr = spawn_server(Arc::new(MemoryStore::new())).await;

    let json: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

fn tls_fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/tls")
        .join(name)
}

#[tokio::test]
async fn test_review_over_https() {
    let store = Arc::new(MemoryStore::with_rules([Rule::new(
        "nginx",
        "^default$",
        vec![r"^nginx:1\.".to_string()],
    )
    .with_decision(true, "nginx allowed")]));
    let app = create_router(Arc::new(AppState::new(DecisionEngine::with_regex(store))));

    let tls = ServerTlsConfig {
        enabled: true,
        cert_file: tls_fixture("server.crt"),
        key_file: tls_fixture("server.key"),
        ..Default::default()
    };
    let rustls = RustlsConfig::from_config(Arc::new(server_config(&tls).unwrap()));

    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls("127.0.0.1:0".parse().unwrap(), rustls)
        .handle(handle.clone())
        .serve(app.into_make_service());
    tokio::spawn(async move { server.await.unwrap() });
    let addr = handle.listening().await.unwrap();

    let ca = std::fs::read(tls_fixture("ca.crt")).unwrap();
    let client = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca).unwrap())
        .build()
        .unwrap();

    let response = client
        .post(format!("https://127.0.0.1:{}/api/v1/review", addr.port()))
        .json(&review("default", &["nginx:1.25"], json!({})))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"]["allowed"], true);
    assert_eq!(json["status"]["reason"], "nginx allowed");

    let plain = reqwest::get(format!("http://127.0.0.1:{}/health", addr.port())).await;
    assert!(plain.is_err() || !plain.unwrap().status().is_success());

    handle.shutdown();
}
