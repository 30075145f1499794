//! Tool server core: routes JSON-RPC requests to the tool registry.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use memlayer_core::MemoryEngine;

use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;

/// JSON-RPC tool server over one memory engine.
pub struct ToolServer {
    engine: Arc<MemoryEngine>,
    initialized: bool,
}

impl ToolServer {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            initialized: false,
        }
    }

    /// Handle one request. `None` means the message was a notification
    /// and no response goes on the wire.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        // Use the client's protocol version when it is older than ours;
        // clients reject servers that answer with a newer one
        let requested = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        let negotiated = if requested < PROTOCOL_VERSION {
            requested
        } else {
            PROTOCOL_VERSION
        };

        self.initialized = true;
        info!("session initialized with protocol version {}", negotiated);

        Ok(json!({
            "protocolVersion": negotiated,
            "serverInfo": {
                "name": "memlayer",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "tools": {"listChanged": false},
            },
            "instructions": "MemLayer is a lifecycle memory engine. Upsert raw events as they \
                 happen, commit episode summaries when a session wraps up, promote stable \
                 validated facts to canonical memory, and search before answering questions \
                 about prior work.",
        }))
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = tools::descriptions()
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
        let arguments = params.get("arguments").cloned();

        let outcome = tools::dispatch(name, &self.engine, arguments)
            .await
            .ok_or_else(|| JsonRpcError::method_not_found(name))?;

        match outcome {
            Ok(envelope) => {
                let text = serde_json::to_string(&envelope)
                    .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
                Ok(json!({
                    "content": [{"type": "text", "text": text}],
                    "isError": envelope.get("status").and_then(Value::as_str) == Some("error"),
                }))
            }
            Err(message) => Err(JsonRpcError::invalid_params(&message)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::JSONRPC_VERSION;
    use crate::tools::test_support::test_engine;

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    async fn initialized_server() -> (ToolServer, tempfile::TempDir) {
        let (engine, dir) = test_engine();
        let mut server = ToolServer::new(engine);
        server
            .handle_request(request("initialize", Some(json!({}))))
            .await
            .unwrap();
        (server, dir)
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let (engine, _dir) = test_engine();
        let mut server = ToolServer::new(engine);

        let response = server.handle_request(request("tools/list", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32003);
    }

    #[tokio::test]
    async fn tools_list_contains_all_eight_tools() {
        let (mut server, _dir) = initialized_server().await;
        let response = server.handle_request(request("tools/list", None)).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 8);
    }

    #[tokio::test]
    async fn tools_call_routes_to_upsert() {
        let (mut server, _dir) = initialized_server().await;
        let params = json!({
            "name": "mem_upsert",
            "arguments": {
                "tenant_id": "t1",
                "workspace_id": "w1",
                "content": "server round trip",
                "idempotency_key": "k1"
            }
        });

        let response = server.handle_request(request("tools/call", Some(params))).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);

        let text = result["content"][0]["text"].as_str().unwrap();
        let envelope: Value = serde_json::from_str(text).unwrap();
        assert_eq!(envelope["status"], "ok");
        assert_eq!(envelope["data"]["layer"], "L0");
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let (mut server, _dir) = initialized_server().await;
        let params = json!({"name": "mem_unknown", "arguments": {}});
        let response = server.handle_request(request("tools/call", Some(params))).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (engine, _dir) = test_engine();
        let mut server = ToolServer::new(engine);
        let notification = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(server.handle_request(notification).await.is_none());
    }
}
