//! HTTP surface for the dispatcher.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | Every registered tool definition |
//! | `POST` | `/tools/{name}` | Invoke a tool; the body is its parameter object |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! `POST /tools/{name}` always answers with the [`ToolResult`] envelope. The
//! HTTP status mirrors the envelope's `error` category:
//!
//! | `error` | Status |
//! |---------|--------|
//! | *(empty)* | 200 |
//! | `tool not found` | 404 |
//! | `invalid parameters` | 400 |
//! | `client error` | 422 |
//! | `unavailable` | 503 |
//! | `internal failure` | 500 |
//!
//! A body that is not valid JSON is reported as `invalid parameters`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::GatewayError;
use crate::tools::{Dispatcher, ToolDefinition, ToolInvocationRequest, ToolResult};

/// Build the router. Split from [`run_server`] so tests can serve it on an
/// ephemeral port.
pub fn router(dispatcher: Dispatcher) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(dispatcher)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config, dispatcher: Dispatcher) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let tool_count = dispatcher.catalog().len();
    let app = router(dispatcher);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, tools = tool_count, "gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// HTTP status for an envelope.
pub fn status_for(result: &ToolResult) -> StatusCode {
    if result.success {
        return StatusCode::OK;
    }
    match result.error.as_str() {
        "tool not found" => StatusCode::NOT_FOUND,
        "invalid parameters" => StatusCode::BAD_REQUEST,
        "client error" => StatusCode::UNPROCESSABLE_ENTITY,
        "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct Envelope(ToolResult);

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(self.0)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse<'a> {
    tools: &'a [ToolDefinition],
}

async fn handle_list_tools(State(dispatcher): State<Dispatcher>) -> Response {
    Json(ToolListResponse {
        tools: dispatcher.catalog(),
    })
    .into_response()
}

// ============ POST /tools/{name} ============

/// The body is taken as raw bytes so malformed JSON still yields the
/// envelope rather than axum's plain-text rejection.
async fn handle_tool_call(
    State(dispatcher): State<Dispatcher>,
    Path(name): Path<String>,
    body: Bytes,
) -> Envelope {
    let parameters = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => v,
            Err(e) => {
                let err = GatewayError::invalid(format!("request body is not valid JSON: {}", e));
                return Envelope(ToolResult::failure(&err));
            }
        }
    };

    Envelope(
        dispatcher
            .dispatch(ToolInvocationRequest::new(name, parameters))
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::ToolNotFound("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::invalid("x"), StatusCode::BAD_REQUEST),
            (
                GatewayError::ClientError {
                    status: 404,
                    message: "x".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (GatewayError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                GatewayError::InternalFailure("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&ToolResult::failure(&err)), status, "{}", err);
        }
        assert_eq!(status_for(&ToolResult::ok(json!(null), "ok")), StatusCode::OK);
    }
}
