//! HTTP Streamable transport for MCP.
//!
//! Native HTTP transport implementing the MCP Streamable HTTP protocol —
//! serves the same `McpServer` the stdio transport drives, over:
//! - POST /mcp — JSON-RPC request -> SSE or JSON response
//! - GET /mcp — standalone SSE stream for server notifications
//! - DELETE /mcp — terminate session

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::registry::ProjectRegistry;
use crate::server::McpServer;

/// Per-session state: one `McpServer` (and so one `initialized` flag) per
/// `mcp-session-id`, all sharing the process-wide `ProjectRegistry` so two
/// sessions against the same project hit the same engine and covenant.
struct Session {
    server: Mutex<McpServer>,
}

struct AppState {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    registry: Arc<ProjectRegistry>,
}

pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
        }
    }
}

pub struct HttpTransport {
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self { config }
    }

    pub async fn run(self, registry: Arc<ProjectRegistry>) -> Result<(), std::io::Error> {
        let state = Arc::new(AppState {
            sessions: Mutex::new(HashMap::new()),
            registry,
        });

        let app = Router::new()
            .route("/mcp", post(handle_post))
            .route("/mcp", get(handle_get))
            .route("/mcp", delete(handle_delete))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        info!("mcp http server listening on http://{addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("mcp http server shutting down");
        Ok(())
    }
}

async fn get_or_create_session(state: &AppState, headers: &HeaderMap) -> (Arc<Session>, String) {
    let existing_id = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()).map(str::to_string);

    let mut sessions = state.sessions.lock().await;
    if let Some(id) = &existing_id {
        if let Some(session) = sessions.get(id) {
            return (session.clone(), id.clone());
        }
    }

    let session_id = Uuid::new_v4().to_string();
    // Every session shares the one process-wide registry — distinct session
    // ids give distinct `initialized` handshakes, not distinct engines, so
    // two HTTP sessions against the same project hit the same engine and
    // covenant state rather than racing two independent writers.
    let server = McpServer::new(state.registry.clone());
    let session = Arc::new(Session { server: Mutex::new(server) });
    sessions.insert(session_id.clone(), session.clone());
    info!(session_id, "created mcp session");
    (session, session_id)
}

async fn get_existing_session(state: &AppState, headers: &HeaderMap) -> Option<(Arc<Session>, String)> {
    let id = headers.get("mcp-session-id").and_then(|v| v.to_str().ok())?;
    let sessions = state.sessions.lock().await;
    sessions.get(id).map(|s| (s.clone(), id.to_string()))
}

async fn handle_post(State(state): State<Arc<AppState>>, headers: HeaderMap, body: String) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to parse json-rpc request");
            let error_resp = JsonRpcResponse::error(None, JsonRpcError::parse_error());
            return (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&error_resp).unwrap_or_default(),
            )
                .into_response();
        }
    };

    let (session, session_id) = get_or_create_session(&state, &headers).await;
    let mut server = session.server.lock().await;
    let response = server.handle_request(request).await;
    drop(server);

    match response {
        Some(resp) => {
            let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
                error!(error = %e, "failed to serialize response");
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#.to_string()
            });

            let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).unwrap_or("application/json");
            if accept.contains("text/event-stream") {
                let event = Event::default().data(&json);
                let sse_stream = stream::once(async move { Ok::<_, std::convert::Infallible>(event) });
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE.as_str(), "text/event-stream"),
                        ("mcp-session-id", &session_id),
                        (header::CACHE_CONTROL.as_str(), "no-cache"),
                    ],
                    Sse::new(sse_stream),
                )
                    .into_response()
            } else {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE.as_str(), "application/json"), ("mcp-session-id", &session_id)],
                    json,
                )
                    .into_response()
            }
        }
        None => (StatusCode::ACCEPTED, [("mcp-session-id", session_id.as_str())]).into_response(),
    }
}

async fn handle_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match get_existing_session(&state, &headers).await {
        Some((_session, session_id)) => {
            let events = vec![Ok::<_, std::convert::Infallible>(Event::default().comment("connected"))];
            let sse_stream = stream::iter(events);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE.as_str(), "text/event-stream"),
                    ("mcp-session-id", session_id.as_str()),
                    (header::CACHE_CONTROL.as_str(), "no-cache"),
                ],
                Sse::new(sse_stream),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "No active session. Send POST /mcp first.").into_response(),
    }
}

async fn handle_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) {
        Some(id) => {
            let mut sessions = state.sessions.lock().await;
            if sessions.remove(id).is_some() {
                info!(session_id = id, "terminated mcp session");
                StatusCode::OK.into_response()
            } else {
                (StatusCode::NOT_FOUND, "Session not found").into_response()
            }
        }
        None => (StatusCode::BAD_REQUEST, "Missing mcp-session-id header").into_response(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for sigterm")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, shutting down"),
        _ = terminate => info!("received sigterm, shutting down"),
    }
}
