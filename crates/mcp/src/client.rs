//! MCP client: the protocol handshake and tool calls against a single server.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    error::{Context, Error, McpTransportError, Result},
    http_transport::HttpTransport,
    traits::{McpTransport, ToolCaller},
    transport::StdioTransport,
    types::{
        ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, McpToolDef,
        PROTOCOL_VERSION, ToolsCallParams, ToolsCallResult, ToolsListResult,
    },
};

/// State of an MCP client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// Transport open, not yet initialized.
    Connected,
    /// `initialize` completed, `initialized` notification sent.
    Ready,
    /// Server process exited or was shut down.
    Closed,
}

/// A client connected to one server over any [`McpTransport`].
pub struct McpClient {
    server_name: String,
    transport: Arc<dyn McpTransport>,
    state: McpClientState,
    closed: AtomicBool,
    server_info: Option<InitializeResult>,
    tools: Vec<McpToolDef>,
}

impl McpClient {
    /// Spawn the server process and perform the handshake.
    pub async fn connect_stdio(
        server_name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        info!(server = %server_name, command = %command, args = ?args, "connecting to MCP server");
        let transport = StdioTransport::spawn(command, args, env, timeout).await?;
        Self::connect_with(server_name, transport).await
    }

    /// Connect to a remote server over HTTP and perform the handshake.
    pub async fn connect_http(server_name: &str, url: &str, timeout: Duration) -> Result<Self> {
        info!(server = %server_name, url = %url, "connecting to MCP server via HTTP");
        let transport = HttpTransport::new(url, timeout)?;
        Self::connect_with(server_name, transport).await
    }

    /// Perform the handshake over an already-open transport.
    pub async fn connect_with(server_name: &str, transport: Arc<dyn McpTransport>) -> Result<Self> {
        let mut client = Self {
            server_name: server_name.into(),
            transport,
            state: McpClientState::Connected,
            closed: AtomicBool::new(false),
            server_info: None,
            tools: Vec::new(),
        };
        if let Err(e) = client.initialize().await {
            warn!(server = %server_name, error = %e, "MCP initialize handshake failed");
            client.transport.close().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "agentwire".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let result = self
            .transport
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await?
            .into_result()?;
        let result: InitializeResult =
            serde_json::from_value(result).context("failed to parse MCP initialize result")?;

        if result.protocol_version != PROTOCOL_VERSION {
            return Err(Error::message(format!(
                "MCP server '{}' speaks protocol {}, expected {PROTOCOL_VERSION}",
                self.server_name, result.protocol_version
            )));
        }
        info!(
            server = %self.server_name,
            protocol = %result.protocol_version,
            server_name = %result.server_info.name,
            "MCP server initialized"
        );
        self.server_info = Some(result);

        self.transport
            .notify("notifications/initialized", None)
            .await?;
        self.state = McpClientState::Ready;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        let state = self.state();
        if state == McpClientState::Closed {
            return Err(McpTransportError::Closed.into());
        }
        if state != McpClientState::Ready {
            return Err(Error::message(format!(
                "MCP client for '{}' is not ready (state: {state:?})",
                self.server_name
            )));
        }
        Ok(())
    }

    pub fn state(&self) -> McpClientState {
        if self.closed.load(Ordering::SeqCst) {
            McpClientState::Closed
        } else {
            self.state
        }
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Cached tool definitions (call [`Self::list_tools`] first).
    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    /// Fetch the server's tools, caching the result.
    pub async fn list_tools(&mut self) -> Result<&[McpToolDef]> {
        self.ensure_ready()?;
        let result = self
            .transport
            .request("tools/list", None)
            .await?
            .into_result()?;
        let result: ToolsListResult =
            serde_json::from_value(result).context("failed to parse tools/list result")?;
        debug!(server = %self.server_name, count = result.tools.len(), "fetched MCP tools");
        self.tools = result.tools;
        Ok(&self.tools)
    }

    pub async fn is_alive(&self) -> bool {
        self.state() != McpClientState::Closed && self.transport.is_alive().await
    }

    /// Close the connection. Later calls fail; repeated closes are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.close().await;
        debug!(server = %self.server_name, "MCP client closed");
    }
}

#[async_trait::async_trait]
impl ToolCaller for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolsCallResult> {
        self.ensure_ready()?;
        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };
        let result = self
            .transport
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?
            .into_result()?;
        serde_json::from_value(result)
            .with_context(|| format!("failed to parse tools/call result for '{name}'"))
    }
}
