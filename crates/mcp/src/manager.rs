//! McpManager: lifecycle of the configured MCP server connections.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use {
    agentwire_agents::ToolRegistry,
    agentwire_config::{McpConfig, McpServerEntry, TransportKind},
    tracing::{info, warn},
};

use crate::{
    client::McpClient,
    error::{Error, Result},
    tool_bridge::McpToolBridge,
    traits::ToolCaller,
    types::McpToolDef,
};

/// Status of a managed MCP server.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub transport: TransportKind,
    pub alive: bool,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<String>,
}

struct ManagedServer {
    transport: TransportKind,
    client: Arc<McpClient>,
    tools: Vec<McpToolDef>,
}

/// Connects to every enabled server, exposes their tools as registry
/// entries, and closes the connections on shutdown.
pub struct McpManager {
    config: McpConfig,
    servers: BTreeMap<String, ManagedServer>,
}

impl McpManager {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            servers: BTreeMap::new(),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs.max(1))
    }

    /// Start all enabled servers. Failures are logged and skipped; returns
    /// the names that came up.
    pub async fn start_enabled(&mut self) -> Vec<String> {
        let mut enabled: Vec<(String, McpServerEntry)> = self
            .config
            .servers
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        enabled.sort_by(|a, b| a.0.cmp(&b.0));

        let mut started = Vec::new();
        for (name, entry) in enabled {
            match self.start_server(&name, &entry).await {
                Ok(count) => {
                    info!(server = %name, tools = count, "MCP server started");
                    started.push(name);
                },
                Err(e) => warn!(server = %name, error = %e, "failed to start MCP server"),
            }
        }
        started
    }

    /// Connect one server, replacing any earlier connection under that name.
    /// Returns the number of tools it offers.
    pub async fn start_server(&mut self, name: &str, entry: &McpServerEntry) -> Result<usize> {
        self.stop_server(name).await;

        let timeout = self.request_timeout();
        let mut client = match entry.transport {
            TransportKind::Stdio => {
                if entry.command.trim().is_empty() {
                    return Err(Error::message(format!(
                        "stdio transport for '{name}' requires a command"
                    )));
                }
                McpClient::connect_stdio(name, &entry.command, &entry.args, &entry.env, timeout)
                    .await?
            },
            TransportKind::Http => {
                let url = entry.url.as_deref().ok_or_else(|| {
                    Error::message(format!("http transport for '{name}' requires a url"))
                })?;
                McpClient::connect_http(name, url, timeout).await?
            },
        };

        let tools = match client.list_tools().await {
            Ok(tools) => tools.to_vec(),
            Err(e) => {
                client.close().await;
                return Err(e);
            },
        };
        let count = tools.len();
        self.servers.insert(name.to_string(), ManagedServer {
            transport: entry.transport,
            client: Arc::new(client),
            tools,
        });
        Ok(count)
    }

    pub async fn stop_server(&mut self, name: &str) -> bool {
        match self.servers.remove(name) {
            Some(server) => {
                server.client.close().await;
                true
            },
            None => false,
        }
    }

    /// Register one adapter per remote tool. Returns how many were added.
    pub fn register_tools(&self, registry: &mut ToolRegistry) -> usize {
        let mut added = 0;
        for server in self.servers.values() {
            let caller: Arc<dyn ToolCaller> = Arc::clone(&server.client) as Arc<dyn ToolCaller>;
            for bridge in McpToolBridge::from_tools(&server.tools, &caller) {
                registry.register(Box::new(bridge));
                added += 1;
            }
        }
        added
    }

    pub async fn status(&self) -> Vec<ServerStatus> {
        let mut out = Vec::with_capacity(self.servers.len());
        for (name, server) in &self.servers {
            out.push(ServerStatus {
                name: name.clone(),
                transport: server.transport,
                alive: server.client.is_alive().await,
                tool_count: server.tools.len(),
                server_info: server.client.server_info().map(|info| {
                    match &info.server_info.version {
                        Some(v) => format!("{} {v}", info.server_info.name),
                        None => info.server_info.name.clone(),
                    }
                }),
            });
        }
        out
    }

    /// Close every connection.
    pub async fn shutdown_all(&mut self) {
        let names: Vec<String> = self.servers.keys().cloned().collect();
        for name in names {
            self.stop_server(&name).await;
        }
        info!("all MCP servers shut down");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, std::collections::HashMap};

    fn http_entry(url: String) -> McpServerEntry {
        McpServerEntry {
            transport: TransportKind::Http,
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn stdio_without_command_is_rejected() {
        let mut manager = McpManager::new(McpConfig::default());
        let entry = McpServerEntry {
            url: None,
            transport: TransportKind::Stdio,
            ..http_entry(String::new())
        };
        let err = manager.start_server("broken", &entry).await.unwrap_err();
        assert!(err.to_string().contains("requires a command"));
    }

    #[tokio::test]
    async fn disabled_and_failing_servers_are_skipped() {
        let mut config = McpConfig::default();
        config.servers.insert("off".into(), McpServerEntry {
            enabled: false,
            ..http_entry("http://127.0.0.1:9/mcp".into())
        });
        config.servers.insert("missing".into(), McpServerEntry {
            transport: TransportKind::Stdio,
            command: "nonexistent_command_xyz_42".into(),
            ..http_entry(String::new())
        });
        let mut manager = McpManager::new(config);
        assert!(manager.start_enabled().await.is_empty());
        assert!(manager.status().await.is_empty());
    }

    #[tokio::test]
    async fn http_server_tools_are_registered_with_prefix() {
        let mut server = mockito::Server::new_async().await;
        let _init = server
            .mock("POST", "/mcp")
            .match_body(Matcher::PartialJson(serde_json::json!({"method": "initialize"})))
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"demo","version":"1.0"}}}"#,
            )
            .create_async()
            .await;
        let _notified = server
            .mock("POST", "/mcp")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"method": "notifications/initialized"}),
            ))
            .with_status(202)
            .create_async()
            .await;
        let _list = server
            .mock("POST", "/mcp")
            .match_body(Matcher::PartialJson(serde_json::json!({"method": "tools/list"})))
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo","inputSchema":{"type":"object"}}]}}"#,
            )
            .create_async()
            .await;

        let mut config = McpConfig::default();
        config
            .servers
            .insert("demo".into(), http_entry(format!("{}/mcp", server.url())));
        let mut manager = McpManager::new(config);
        assert_eq!(manager.start_enabled().await, vec!["demo".to_string()]);

        let mut registry = ToolRegistry::new();
        assert_eq!(manager.register_tools(&mut registry), 1);
        assert!(registry.get("mcp__demo__echo").is_some());

        let status = manager.status().await;
        assert_eq!(status[0].tool_count, 1);
        assert_eq!(status[0].server_info.as_deref(), Some("demo 1.0"));
        assert!(status[0].alive);

        manager.shutdown_all().await;
        assert!(manager.status().await.is_empty());
    }
}
