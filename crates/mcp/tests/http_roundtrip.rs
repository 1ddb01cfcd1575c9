#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end: a real HTTP server exposing a registry, reached through the
//! client, the tool bridge and the agent loop.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    agentwire_agents::{
        AgentSession, AgentTool, ConversationItem, LlmProvider, ToolCall, ToolRegistry,
        TurnOutcome,
        model::CompletionResponse,
        runner::SessionOptions,
        tool_registry::ToolManifestEntry,
    },
    agentwire_config::{McpConfig, McpServerEntry, TransportKind},
    agentwire_mcp::{McpManager, McpServer, server::router},
    async_trait::async_trait,
    serde_json::{Value, json},
};

/// Rejects every call with "bad args".
struct Strict;

#[async_trait]
impl AgentTool for Strict {
    fn name(&self) -> &str {
        "strict"
    }

    fn description(&self) -> &str {
        "Always rejects its arguments"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<String> {
        anyhow::bail!("bad args")
    }
}

struct Echo;

#[async_trait]
impl AgentTool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn execute(&self, params: Value) -> anyhow::Result<String> {
        Ok(params["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Starts a server on an ephemeral port and returns its endpoint URL.
async fn spawn_server() -> String {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(Strict));
    registry.register(Box::new(Echo));
    let app = router(McpServer::new(Arc::new(registry)), "/mcp");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/mcp")
}

async fn connected_registry(url: String) -> (McpManager, Arc<ToolRegistry>) {
    let mut config = McpConfig::default();
    config.request_timeout_secs = 5;
    config.servers.insert("remote".into(), McpServerEntry {
        transport: TransportKind::Http,
        command: String::new(),
        args: Vec::new(),
        env: Default::default(),
        url: Some(url),
        enabled: true,
    });
    let mut manager = McpManager::new(config);
    assert_eq!(manager.start_enabled().await, vec!["remote".to_string()]);
    let mut registry = ToolRegistry::new();
    assert_eq!(manager.register_tools(&mut registry), 2);
    (manager, Arc::new(registry))
}

#[tokio::test]
async fn remote_is_error_reaches_adapter_as_text() {
    let (mut manager, registry) = connected_registry(spawn_server().await).await;

    let strict = registry.get("mcp__remote__strict").unwrap();
    assert_eq!(strict.execute(json!({})).await.unwrap(), "bad args");

    let echo = registry.get("mcp__remote__echo").unwrap();
    assert_eq!(echo.execute(json!({"text": "ping"})).await.unwrap(), "ping");

    manager.shutdown_all().await;
}

#[tokio::test]
async fn unknown_tool_is_an_application_error_not_method_not_found() {
    let url = spawn_server().await;
    let body: Value = reqwest::Client::new()
        .post(&url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {"name": "does_not_exist", "arguments": {}}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(body.get("error").is_none());
    assert_eq!(body["id"], 9);
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        "capability not found: does_not_exist"
    );
}

/// Calls the remote tool once, then answers with whatever the tool said.
struct RemoteCallingProvider {
    calls: AtomicUsize,
    seen_result: Mutex<Option<String>>,
}

#[async_trait]
impl LlmProvider for RemoteCallingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn id(&self) -> &str {
        "mock-remote"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        items: &[ConversationItem],
        _manifest: &[ToolManifestEntry],
        _temperature: f32,
    ) -> anyhow::Result<CompletionResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(CompletionResponse::tool_calls(vec![ToolCall {
                id: "call_remote".into(),
                name: "mcp__remote__strict".into(),
                arguments: json!({"x": 1}),
            }]));
        }
        let last = match items.last() {
            Some(ConversationItem::ToolResult { content, .. }) => content.clone(),
            other => panic!("expected a tool result, got {other:?}"),
        };
        *self.seen_result.lock().unwrap() = Some(last.clone());
        Ok(CompletionResponse::text(format!("The tool said: {last}")))
    }
}

#[tokio::test]
async fn agent_loop_continues_after_remote_tool_error() {
    let (mut manager, registry) = connected_registry(spawn_server().await).await;
    let provider = Arc::new(RemoteCallingProvider {
        calls: AtomicUsize::new(0),
        seen_result: Mutex::new(None),
    });
    let mut session = AgentSession::new(provider.clone(), registry, SessionOptions::default());

    let outcome = tokio::time::timeout(Duration::from_secs(10), session.process_turn("try it"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::FinalAnswer("The tool said: bad args".into())
    );
    assert_eq!(provider.seen_result.lock().unwrap().as_deref(), Some("bad args"));
    assert!(session.conversation().is_balanced());
    manager.shutdown_all().await;
}
