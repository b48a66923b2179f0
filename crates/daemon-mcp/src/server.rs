//! MCP server core: routes JSON-RPC methods to the tool dispatcher and the
//! `daem0n://` resource reader. One `McpServer` is shared by every
//! connection a transport accepts; state lives in the `ProjectRegistry`
//! (one engine per project, opened lazily), not in the server itself.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatcher;
use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListResourcesResult,
    ListToolsResult, ReadResourceRequest, ReadResourceResult, ResourceContent, ServerCapabilities,
    ServerInfo,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::registry::ProjectRegistry;
use crate::resources;
use crate::tools;

/// MCP server implementation. `initialized` tracks the handshake state
/// required before any other method is served; project/engine state lives
/// one level down in `ProjectRegistry`, which this server shares across every
/// request a transport hands it.
pub struct McpServer {
    registry: Arc<ProjectRegistry>,
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: Arc<ProjectRegistry>) -> Self {
        Self {
            registry,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request, returning `None` for notifications
    /// (`notifications/initialized`) that expect no response.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "handling request");

        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!(method = %request.method, "rejecting request: server not initialized");
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => self.handle_resources_list(request.params).await,
            "resources/read" => self.handle_resources_read(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!(method, "unknown method");
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(&mut self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Claude Desktop and other early clients reject a server whose
        // negotiated version is newer than theirs; fall back to the
        // client's version when it's older than ours.
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            info!(client_version = %request.protocol_version, "negotiating down to client's protocol version");
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!(protocol_version = %negotiated, "mcp session initialized");

        if let Some(project) = client_default_project(&request) {
            self.registry.set_default_project(&project);
        }

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "daem0n".to_string(),
                version: daemon_core::VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                prompts: None,
            },
            instructions: Some(
                "daem0n is your project's persistent memory. Before any non-briefing call, run \
                 commune.briefing once per session; before any mutating call (inscribe, reflect, \
                 govern, maintain), run consult.preflight to obtain a token bound to this session. \
                 Use consult.recall to surface prior decisions, warnings, and patterns before \
                 making a change; use inscribe.remember to record a new one after."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult { tools: tools::list() };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call parameters")),
        };

        let call_result = match dispatcher::dispatch(&self.registry, &request.name, request.arguments).await {
            Ok(value) => CallToolResult::ok(&value),
            Err(e) => CallToolResult::error(&serde_json::to_string(&e.to_envelope()).unwrap_or_else(|_| e.to_string())),
        };

        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_resources_list(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let project = params
            .as_ref()
            .and_then(|p| p.get("projectPath"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.registry.default_project().ok())
            .unwrap_or_default();

        let result = ListResourcesResult { resources: resources::list(&project) };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_resources_read(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: ReadResourceRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing resource uri")),
        };

        let content = resources::read(&self.registry, &request.uri).map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;

        let result = ReadResourceResult {
            contents: vec![ResourceContent {
                uri: request.uri,
                mime_type: Some("application/json".to_string()),
                text: Some(serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string())),
                blob: None,
            }],
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

/// `initialize`'s `clientInfo` has no standard project-path field; some
/// clients pass one anyway (editor integrations that know their own
/// workspace root) under a `projectPath`/`cwd` key, which we accept
/// opportunistically to seed the `daem0n://triggered/{file}` resource's
/// default-project resolution.
fn client_default_project(request: &InitializeRequest) -> Option<String> {
    request
        .client_info
        .get("projectPath")
        .or_else(|| request.client_info.get("cwd"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daemon_core::Config;

    fn test_server() -> (McpServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProjectRegistry::new(Config::default()));
        (McpServer::new(registry), dir)
    }

    fn make_request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn uninitialized_server_rejects_non_initialize_methods() {
        let (mut server, _dir) = test_server();
        let response = server.handle_request(make_request("tools/list", None)).await.unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32003);
    }

    #[tokio::test]
    async fn initialize_then_ping_succeeds() {
        let (mut server, _dir) = test_server();
        let init = server.handle_request(make_request("initialize", None)).await.unwrap();
        assert!(init.result.is_some());

        let ping = server.handle_request(make_request("ping", None)).await.unwrap();
        assert_eq!(ping.result.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn notifications_initialized_returns_no_response() {
        let (mut server, _dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("notifications/initialized", None)).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_eleven_tools() {
        let (mut server, _dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("tools/list", None)).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 11);
    }

    #[tokio::test]
    async fn tools_call_before_briefing_returns_communion_required() {
        let (mut server, dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;

        let response = server
            .handle_request(make_request(
                "tools/call",
                Some(serde_json::json!({
                    "name": "consult",
                    "arguments": {"action": "recall", "projectPath": dir.path().to_str().unwrap(), "topic": "auth"}
                })),
            ))
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], serde_json::json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("CommunionRequired"));
    }

    #[tokio::test]
    async fn tools_call_missing_params_returns_invalid_params() {
        let (mut server, _dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("tools/call", None)).await.unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn briefing_then_recall_round_trips() {
        let (mut server, dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;
        let project = dir.path().to_str().unwrap();

        let briefing = server
            .handle_request(make_request(
                "tools/call",
                Some(serde_json::json!({"name": "commune", "arguments": {"action": "briefing", "projectPath": project}})),
            ))
            .await
            .unwrap();
        assert!(briefing.result.unwrap()["isError"].is_null());

        let recall = server
            .handle_request(make_request(
                "tools/call",
                Some(serde_json::json!({
                    "name": "consult",
                    "arguments": {"action": "recall", "projectPath": project, "topic": "auth security"}
                })),
            ))
            .await
            .unwrap();
        assert!(recall.result.unwrap()["isError"].is_null());
    }

    #[tokio::test]
    async fn resources_list_returns_daem0n_resources() {
        let (mut server, dir) = test_server();
        server.handle_request(make_request("initialize", None)).await;
        let response = server
            .handle_request(make_request("resources/list", Some(serde_json::json!({"projectPath": dir.path().to_str().unwrap()}))))
            .await
            .unwrap();
        let resources = response.result.unwrap()["resources"].as_array().unwrap().len();
        assert_eq!(resources, 5);
    }
}
