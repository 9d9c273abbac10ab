// crates/update-relay-server/tests/http_server.rs
// ============================================================================
// Module: HTTP Server Tests
// Description: The manifest endpoint over a real loopback socket.
// ============================================================================
//! ## Overview
//! Starts the axum server on an ephemeral port and checks status codes, error
//! bodies, multipart responses, and access logging.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use update_relay_config::ServerConfig;
use update_relay_config::StatusMapping;
use update_relay_core::LogLevel;
use update_relay_core::Logger;
use update_relay_core::MemoryLogSink;
use update_relay_server::CodeSigner;
use update_relay_server::ServerError;
use update_relay_server::UpdateRelayServer;
use update_relay_storage::InMemoryBlobStore;

use crate::common::METADATA_ID;

/// Running server handle.
struct TestServer {
    /// Manifest endpoint URL.
    url: String,
    /// Captured log events.
    sink: Arc<MemoryLogSink>,
    /// Triggers graceful shutdown.
    shutdown: oneshot::Sender<()>,
    /// Server task.
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Stops the server and waits for it to exit.
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

/// Starts a server over `store` with the given status mapping.
async fn start(store: Arc<InMemoryBlobStore>, status_mapping: StatusMapping) -> TestServer {
    let sink = Arc::new(MemoryLogSink::new());
    let logger = Logger::new(sink.clone(), LogLevel::Debug);
    let service = common::service(store, CodeSigner::disabled());
    let config = ServerConfig {
        status_mapping,
        ..ServerConfig::default()
    };
    let server = UpdateRelayServer::new(service, &config, logger);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve_with_listener(listener, async move {
        let _ = rx.await;
    }));
    TestServer {
        url: format!("http://{addr}/api/manifest"),
        sink,
        shutdown,
        task,
    }
}

/// Sends a manifest request with the given headers.
async fn get(url: &str, headers: &[(&str, &str)]) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request.send().await.unwrap()
}

// ============================================================================
// SECTION: Success
// ============================================================================

/// Tests a manifest response arrives as multipart with protocol headers.
#[tokio::test]
async fn test_manifest_over_http() {
    let server = start(common::seeded_store(), StatusMapping::Compat).await;
    let response = get(
        &server.url,
        &[
            ("expo-protocol-version", "1"),
            ("expo-platform", "ios"),
            ("expo-runtime-version", "1.0.0"),
        ],
    )
    .await;
    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers["expo-protocol-version"], "1");
    assert_eq!(headers["expo-sfv-version"], "0");
    assert_eq!(headers["cache-control"], "private, max-age=0");
    let boundary = common::boundary_of(headers["content-type"].to_str().unwrap());
    let body = response.bytes().await.unwrap();
    let parts = common::parse_multipart(&body, &boundary);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].json()["id"], METADATA_ID);
    server.stop().await;
}

/// Tests query parameters stand in for missing headers.
#[tokio::test]
async fn test_query_parameters_select_platform_and_runtime() {
    let server = start(common::seeded_store(), StatusMapping::Compat).await;
    let url = format!("{}?platform=android&runtime-version=1.0.0", server.url);
    let response = get(&url, &[("expo-protocol-version", "1")]).await;
    assert_eq!(response.status(), 200);
    server.stop().await;
}

/// Tests a current client receives the directive and the access log records it.
#[tokio::test]
async fn test_no_update_directive_is_logged() {
    let server = start(common::seeded_store(), StatusMapping::Compat).await;
    let response = get(
        &server.url,
        &[
            ("expo-protocol-version", "1"),
            ("expo-platform", "ios"),
            ("expo-runtime-version", "1.0.0"),
            ("expo-current-update-id", METADATA_ID),
        ],
    )
    .await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"{"type":"noUpdateAvailable"}"#));
    let events = server.sink.events();
    let access = events.iter().find(|event| event.event == "http_request").unwrap();
    assert_eq!(access.fields["status"], 200);
    assert_eq!(access.fields["path"], "/api/manifest");
    server.stop().await;
}

// ============================================================================
// SECTION: Client Errors
// ============================================================================

/// Tests validation failures answer 400 with the client message.
#[tokio::test]
async fn test_validation_errors_answer_bad_request() {
    let server = start(common::seeded_store(), StatusMapping::Compat).await;
    let cases: [(&[(&str, &str)], &str); 3] = [
        (
            &[("expo-platform", "web"), ("expo-runtime-version", "1.0.0")],
            "Unsupported platform. Expected either ios or android.",
        ),
        (&[("expo-platform", "ios")], "No runtimeVersion provided."),
        (
            &[
                ("expo-protocol-version", "2"),
                ("expo-platform", "ios"),
                ("expo-runtime-version", "1.0.0"),
            ],
            "Unsupported protocol version. Expected either 0 or 1.",
        ),
    ];
    for (headers, message) in cases {
        let response = get(&server.url, headers).await;
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": message }));
    }
    server.stop().await;
}

/// Tests a signature request without a configured key answers 400.
#[tokio::test]
async fn test_signature_without_key_answers_bad_request() {
    let server = start(common::seeded_store(), StatusMapping::Compat).await;
    let response = get(
        &server.url,
        &[
            ("expo-protocol-version", "1"),
            ("expo-platform", "ios"),
            ("expo-runtime-version", "1.0.0"),
            ("expo-expect-signature", "sig, keyid=\"main\""),
        ],
    )
    .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "error": "Code signing requested but no key supplied when starting server." })
    );
    server.stop().await;
}

// ============================================================================
// SECTION: Status Mapping
// ============================================================================

/// Tests protocol failures answer 404 in compat mode and 400 in strict mode.
#[tokio::test]
async fn test_protocol_failures_follow_status_mapping() {
    let headers = [("expo-platform", "ios"), ("expo-runtime-version", "1.0.0")];
    for (mapping, status) in [(StatusMapping::Compat, 404), (StatusMapping::Strict, 400)] {
        let store = common::seeded_store();
        common::publish_rollback(&store, common::RUNTIME, 1_714_570_000);
        let server = start(store, mapping).await;
        let response = get(&server.url, &headers).await;
        assert_eq!(response.status(), status);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Rollbacks not supported on protocol version 0" }));
        server.stop().await;
    }
}

/// Tests storage failures answer 404 in compat mode and 500 in strict mode.
#[tokio::test]
async fn test_backend_failures_follow_status_mapping() {
    for (mapping, status) in [(StatusMapping::Compat, 404), (StatusMapping::Strict, 500)] {
        let store = common::seeded_store();
        store.fail_with(Some(update_relay_storage::BlobStoreError::Backend(
            "unavailable".to_string(),
        )));
        let server = start(store, mapping).await;
        let response =
            get(&server.url, &[("expo-platform", "ios"), ("expo-runtime-version", "1.0.0")]).await;
        assert_eq!(response.status(), status);
        let events = server.sink.events();
        assert!(events.iter().any(|event| event.event == "request_failed"
            && event.level == LogLevel::Error));
        server.stop().await;
    }
}

/// Tests an unpublished runtime version answers 404.
#[tokio::test]
async fn test_unknown_runtime_version_answers_not_found() {
    let server = start(common::seeded_store(), StatusMapping::Strict).await;
    let response =
        get(&server.url, &[("expo-platform", "ios"), ("expo-runtime-version", "7.0.0")]).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "No updates found for runtime version 7.0.0" }));
    server.stop().await;
}
