//! HTTP round trips: the reqwest backend against a mock vault server, and
//! the gateway's own HTTP surface.

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use vault_gateway::config::{Config, TransportConfig, VaultConfig};
use vault_gateway::gateway::Gateway;
use vault_gateway::inference::DisabledProvider;
use vault_gateway::server::router;
use vault_gateway::tools::ToolRegistry;
use vault_gateway::transport::{HttpBackend, VaultRequest};
use vault_gateway::vault::memory::MemoryVault;

const API_KEY: &str = "s3cret";

// ============ Mock vault ============

struct MockVault {
    vault: MemoryVault,
    hits: AtomicUsize,
    /// Non-zero: answer every request with this status.
    fail_with: AtomicU16,
}

async fn mock_vault_handler(
    State(state): State<Arc<MockVault>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"errorCode":40101,"message":"Authorization required"}"#.to_string(),
        );
    }

    let fail = state.fail_with.load(Ordering::SeqCst);
    if fail != 0 {
        let status = StatusCode::from_u16(fail).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "mock failure".to_string());
    }

    let request = VaultRequest {
        method,
        path: uri.path().to_string(),
        body: if body.is_empty() { None } else { Some(body) },
    };
    let response = state.vault.handle(&request);
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.body)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_mock_vault(docs: &[(&str, &str)]) -> (SocketAddr, Arc<MockVault>) {
    let state = Arc::new(MockVault {
        vault: MemoryVault::with_documents(docs.iter().map(|(p, c)| (p.to_string(), c.to_string()))),
        hits: AtomicUsize::new(0),
        fail_with: AtomicU16::new(0),
    });
    let app = Router::new()
        .fallback(mock_vault_handler)
        .with_state(state.clone());
    (spawn(app).await, state)
}

fn fast_config(addr: SocketAddr) -> Config {
    let mut config = Config::default();
    config.vault = VaultConfig {
        base_url: format!("http://{}/", addr),
        ..VaultConfig::default()
    };
    config.transport = TransportConfig {
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_ms: 0,
        ..TransportConfig::default()
    };
    config.rate_limit.capacity = 100;
    config.rate_limit.refill_per_sec = 100.0;
    config
}

fn gateway_over_http(config: &Config, api_key: Option<&str>) -> Gateway {
    let backend = HttpBackend::with_api_key(
        &config.vault,
        &config.transport,
        api_key.map(String::from),
    )
    .unwrap();
    Gateway::with_parts(
        config,
        Arc::new(backend),
        Arc::new(DisabledProvider),
        ToolRegistry::with_builtins(),
    )
    .unwrap()
}

async fn invoke(gateway: &Gateway, tool: &str, params: Value) -> vault_gateway::tools::ToolResult {
    gateway
        .dispatcher()
        .dispatch(vault_gateway::tools::ToolInvocationRequest::new(tool, params))
        .await
}

// ============ reqwest backend ============

#[tokio::test]
async fn test_http_backend_round_trip() {
    let (addr, mock) = spawn_mock_vault(&[("notes/a.md", "alpha"), ("b.md", "beta")]).await;
    let config = fast_config(addr);
    let gateway = gateway_over_http(&config, Some(API_KEY));

    let listing = invoke(&gateway, "list_files", json!({})).await;
    assert!(listing.success, "{:?}", listing);
    assert_eq!(listing.data.as_array().unwrap().len(), 2);

    let read = invoke(&gateway, "read_note", json!({"path": "notes/a.md"})).await;
    assert_eq!(read.data["content"], "alpha");

    let created = invoke(
        &gateway,
        "create_note",
        json!({"path": "notes/c.md", "content": "# gamma\n"}),
    )
    .await;
    assert!(created.success, "{:?}", created);
    assert_eq!(mock.vault.get("notes/c.md").as_deref(), Some("# gamma\n"));
}

#[tokio::test]
async fn test_http_backend_missing_credential_is_client_error() {
    let (addr, mock) = spawn_mock_vault(&[("a.md", "a")]).await;
    let gateway = gateway_over_http(&fast_config(addr), None);

    let result = invoke(&gateway, "read_note", json!({"path": "a.md"})).await;
    assert_eq!(result.error, "client error");
    assert!(result.message.contains("Authorization required"));
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_backend_404_is_not_retried() {
    let (addr, mock) = spawn_mock_vault(&[]).await;
    let gateway = gateway_over_http(&fast_config(addr), Some(API_KEY));

    let result = invoke(&gateway, "read_note", json!({"path": "ghost.md"})).await;
    assert_eq!(result.error, "client error");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_backend_500_is_retried_then_unavailable() {
    let (addr, mock) = spawn_mock_vault(&[("a.md", "a")]).await;
    mock.fail_with.store(500, Ordering::SeqCst);
    let gateway = gateway_over_http(&fast_config(addr), Some(API_KEY));

    let result = invoke(&gateway, "read_note", json!({"path": "a.md"})).await;
    assert_eq!(result.error, "unavailable");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_http_backend_unreachable_vault() {
    // bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = gateway_over_http(&fast_config(addr), Some(API_KEY));
    let result = invoke(&gateway, "list_files", json!({})).await;
    assert_eq!(result.error, "unavailable");
}

// ============ Gateway server ============

async fn spawn_gateway(docs: &[(&str, &str)]) -> SocketAddr {
    let vault = Arc::new(MemoryVault::with_documents(
        docs.iter().map(|(p, c)| (p.to_string(), c.to_string())),
    ));
    let gateway = Gateway::with_parts(
        &Config::default(),
        vault,
        Arc::new(DisabledProvider),
        ToolRegistry::with_builtins(),
    )
    .unwrap();
    spawn(router(gateway.dispatcher().clone())).await
}

#[tokio::test]
async fn test_server_health_and_catalog() {
    let addr = spawn_gateway(&[]).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let list: Value = client
        .get(format!("http://{}/tools/list", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = list["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 8);
    assert!(tools.iter().any(|t| t["name"] == "search"));
}

#[tokio::test]
async fn test_server_tool_call_statuses() {
    let addr = spawn_gateway(&[("a.md", "alpha")]).await;
    let client = reqwest::Client::new();
    let url = |tool: &str| format!("http://{}/tools/{}", addr, tool);

    let ok = client
        .post(url("read_note"))
        .json(&json!({"path": "a.md"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["content"], "alpha");
    assert_eq!(body["error"], "");

    let missing_tool = client.post(url("nope")).json(&json!({})).send().await.unwrap();
    assert_eq!(missing_tool.status(), 404);
    let body: Value = missing_tool.json().await.unwrap();
    assert_eq!(body["error"], "tool not found");

    let bad_json = client
        .post(url("read_note"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_json.status(), 400);

    let missing_note = client
        .post(url("read_note"))
        .json(&json!({"path": "ghost.md"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_note.status(), 422);

    let empty_body = client.post(url("list_files")).send().await.unwrap();
    assert_eq!(empty_body.status(), 200);
}
