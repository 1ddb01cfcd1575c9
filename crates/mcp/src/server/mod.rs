//! Server role: expose a [`ToolRegistry`] to MCP clients.
//!
//! Dispatch is transport-agnostic; [`http`] and [`stdio`] only move bytes.

pub mod http;
pub mod stdio;

use std::sync::Arc;

use {
    agentwire_agents::ToolRegistry,
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use crate::{
    codec::decode_request,
    types::{
        INTERNAL_ERROR, INVALID_PARAMS, InitializeParams, InitializeResult, JsonRpcError,
        JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, McpToolDef, PROTOCOL_VERSION,
        ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCallResult, ToolsCapability,
        ToolsListResult,
    },
};

pub use {
    http::{router, serve_http},
    stdio::serve_stdio,
};

/// The result a method handler produces.
type MethodResult = Result<Value, JsonRpcError>;

/// Answers `initialize`, `tools/list` and `tools/call` from a shared,
/// read-only registry.
#[derive(Clone)]
pub struct McpServer {
    tools: Arc<ToolRegistry>,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            info: ServerInfo {
                name: "agentwire".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            },
        }
    }

    /// Handle one raw message. `None` means nothing is sent back
    /// (a notification).
    pub async fn handle_raw(&self, raw: &str) -> Option<JsonRpcResponse> {
        match decode_request(raw) {
            Ok(request) => self.handle(request).await,
            Err(error_response) => {
                warn!(
                    code = ?error_response.error().map(|e| e.code),
                    "rejecting malformed JSON-RPC message"
                );
                Some(error_response)
            },
        }
    }

    /// Handle one decoded request. Notifications never produce a response,
    /// whatever their method.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, id = ?id, "MCP server <- client");

        let Some(id) = id else {
            match method.as_str() {
                "notifications/initialized" => info!("MCP client initialized"),
                other => debug!(method = %other, "ignoring notification"),
            }
            return None;
        };

        let outcome = match method.as_str() {
            "initialize" => self.initialize(params),
            "notifications/initialized" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %method, code = error.code, message = %error.message, "MCP request failed");
                JsonRpcResponse::failure(id, error)
            },
        })
    }

    fn initialize(&self, params: Option<Value>) -> MethodResult {
        if let Some(params) = params {
            let params: InitializeParams = parse_params(params)?;
            info!(
                client = %params.client_info.name,
                client_version = %params.client_info.version,
                protocol = %params.protocol_version,
                "MCP client connecting"
            );
        }
        to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: self.info.clone(),
        })
    }

    fn list_tools(&self) -> MethodResult {
        let tools = self
            .tools
            .manifest()
            .into_iter()
            .map(|entry| McpToolDef {
                description: (!entry.description.is_empty()).then_some(entry.description),
                name: entry.name,
                input_schema: entry.parameters,
            })
            .collect();
        to_value(ToolsListResult { tools })
    }

    /// Tool failures, including an unknown name, are reported inside the
    /// result with `isError: true`. Only malformed params are RPC errors.
    async fn call_tool(&self, params: Option<Value>) -> MethodResult {
        let params: ToolsCallParams = parse_params(
            params.ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "missing params"))?,
        )?;

        let result = match self.tools.get(&params.name) {
            None => {
                warn!(tool = %params.name, "tools/call for unknown tool");
                ToolsCallResult::error(format!("capability not found: {}", params.name))
            },
            Some(tool) => match tool.execute(params.arguments).await {
                Ok(text) => ToolsCallResult::text(text),
                Err(e) => {
                    warn!(tool = %params.name, error = %e, "tool execution failed");
                    ToolsCallResult::error(e.to_string())
                },
            },
        };
        to_value(result)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

fn to_value<T: serde::Serialize>(value: T) -> MethodResult {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("failed to encode result: {e}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{INVALID_REQUEST, PARSE_ERROR},
        agentwire_agents::AgentTool,
        async_trait::async_trait,
    };

    struct Upper;

    #[async_trait]
    impl AgentTool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }

        async fn execute(&self, params: Value) -> anyhow::Result<String> {
            let text = params["text"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("bad args"))?;
            Ok(text.to_uppercase())
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Upper));
        McpServer::new(Arc::new(registry))
    }

    async fn call(raw: &str) -> JsonRpcResponse {
        server().handle_raw(raw).await.unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_tools_capability() {
        let resp = call(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
        )
        .await;
        let result = resp.result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "agentwire");
    }

    #[tokio::test]
    async fn tools_list_uses_manifest() {
        let resp = call(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        let tools = &resp.result().unwrap()["tools"];
        assert_eq!(tools[0]["name"], "upper");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn tools_call_success_and_tool_error() {
        let ok = call(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"upper","arguments":{"text":"hi"}}}"#,
        )
        .await;
        assert_eq!(
            ok.result().unwrap(),
            &json!({"isError": false, "content": [{"type": "text", "text": "HI"}]})
        );

        let bad = call(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"upper","arguments":{}}}"#,
        )
        .await;
        assert_eq!(
            bad.result().unwrap(),
            &json!({"isError": true, "content": [{"type": "text", "text": "bad args"}]})
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_not_a_method_error() {
        let resp = call(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        assert!(resp.error().is_none());
        assert_eq!(resp.result().unwrap()["isError"], true);
    }

    #[tokio::test]
    async fn error_codes() {
        let unknown = call(r#"{"jsonrpc":"2.0","id":6,"method":"resources/list"}"#).await;
        assert_eq!(unknown.error().unwrap().code, METHOD_NOT_FOUND);
        assert_eq!(unknown.id, json!(6));

        let invalid = call(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"arguments":{}}}"#).await;
        assert_eq!(invalid.error().unwrap().code, INVALID_PARAMS);

        let missing = call(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call"}"#).await;
        assert_eq!(missing.error().unwrap().code, INVALID_PARAMS);

        let garbage = call("{{{").await;
        assert_eq!(garbage.error().unwrap().code, PARSE_ERROR);

        let not_request = call(r#"[1,2,3]"#).await;
        assert_eq!(not_request.error().unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let s = server();
        assert!(
            s.handle_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
        assert!(
            s.handle_raw(r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#)
                .await
                .is_none()
        );
        assert!(
            s.handle_raw(r#"{"jsonrpc":"2.0","method":"no/such"}"#)
                .await
                .is_none()
        );
    }
}
