use super::*;
use crate::config::{Config, EmbeddingConfig, ExecutionDevice};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(temp_dir: &TempDir, server: &MockServer) -> Config {
    let uri = Url::parse(&server.uri()).expect("mock server URI should parse");

    let mut config = Config::default();
    config.document.path = temp_dir.path().join("document.md");
    config.store.location = temp_dir.path().join("index");
    config.embedding = EmbeddingConfig {
        protocol: uri.scheme().to_string(),
        host: uri.host_str().expect("mock server should have host").to_string(),
        port: uri.port().expect("mock server should have port"),
        model: "test-model".to_string(),
        device: ExecutionDevice::Auto,
        batch_size: 16,
    };
    config
}

async fn mount_backend(server: &MockServer, embeddings: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-model", "size": 1000}]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings })),
        )
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_document_fails_before_any_store_write() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    let config = test_config(&temp_dir, &server);

    let result = run_ingestion(&config, None).await;

    let message = result.expect_err("missing document should error").to_string();
    assert!(message.contains("not found"), "unexpected error: {message}");

    // The store location was never touched
    assert!(!config.store.location.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_document_leaves_existing_store_unchanged() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    mount_backend(&server, json!([[0.6, 0.8]])).await;

    let mut config = test_config(&temp_dir, &server);
    std::fs::write(&config.document.path, "some content").expect("should write document");

    run_ingestion(&config, None).await.expect("ingestion should succeed");

    let store = crate::store::VectorStore::open(&config.store.location, &config.store.collection)
        .await
        .expect("store should open");
    assert_eq!(store.count().await.expect("should count"), 1);
    drop(store);

    // Point at a missing document and re-run: the store keeps its entry
    config.document.path = temp_dir.path().join("gone.md");
    let result = run_ingestion(&config, None).await;
    assert!(result.is_err());

    let store = crate::store::VectorStore::open(&config.store.location, &config.store.collection)
        .await
        .expect("store should still open");
    assert_eq!(store.count().await.expect("should count"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_document_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    let config = test_config(&temp_dir, &server);

    std::fs::write(&config.document.path, "  \n\n  ").expect("should write document");

    let result = run_ingestion(&config, None).await;
    let message = result.expect_err("empty document should error").to_string();
    assert!(message.contains("empty"), "unexpected error: {message}");
    assert!(!config.store.location.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_chunk_document_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    mount_backend(&server, json!([[0.6, 0.8]])).await;

    let config = test_config(&temp_dir, &server);
    std::fs::write(&config.document.path, "alpha beta gamma delta")
        .expect("should write document");

    let report = run_ingestion(&config, None).await.expect("ingestion should succeed");

    assert_eq!(report.chunks, 1);
    assert_eq!(report.entries_written, 1);
    assert_eq!(report.dimension, 2);

    let store = crate::store::VectorStore::open(&config.store.location, &config.store.collection)
        .await
        .expect("store should open");
    assert_eq!(store.count().await.expect("should count"), 1);

    let hits = store
        .search(&[0.6, 0.8], 5)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.content, "alpha beta gamma delta");
    assert_eq!(hits[0].metadata.chunk_index, 0);
    assert_eq!(hits[0].metadata.start_offset, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn reingestion_appends_duplicates() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    mount_backend(&server, json!([[0.6, 0.8]])).await;

    let config = test_config(&temp_dir, &server);
    std::fs::write(&config.document.path, "alpha beta gamma delta")
        .expect("should write document");

    run_ingestion(&config, None).await.expect("first run should succeed");
    run_ingestion(&config, None).await.expect("second run should succeed");

    let store = crate::store::VectorStore::open(&config.store.location, &config.store.collection)
        .await
        .expect("store should open");
    assert_eq!(store.count().await.expect("should count"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn document_override_takes_precedence() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    mount_backend(&server, json!([[0.6, 0.8]])).await;

    let config = test_config(&temp_dir, &server);
    let override_path: PathBuf = temp_dir.path().join("other.md");
    std::fs::write(&override_path, "override content").expect("should write document");

    let report = run_ingestion(&config, Some(&override_path))
        .await
        .expect("ingestion should succeed");
    assert_eq!(report.entries_written, 1);

    let store = crate::store::VectorStore::open(&config.store.location, &config.store.collection)
        .await
        .expect("store should open");
    let hits = store
        .search(&[0.6, 0.8], 1)
        .await
        .expect("search should succeed");
    assert!(hits[0].metadata.source.ends_with("other.md"));
}
