//! MCP (Model Context Protocol) support for agentwire.
//!
//! This crate provides:
//! - JSON-RPC 2.0 envelope types and line framing (`types`, `codec`)
//! - stdio and HTTP transports (`transport`, `http_transport`)
//! - MCP client for the handshake and tool calls (`client`)
//! - Tool bridge adapting remote tools to `AgentTool` (`tool_bridge`)
//! - Server lifecycle management (`manager`)
//! - Server role exposing a `ToolRegistry` over HTTP or stdio (`server`)

pub mod client;
pub mod codec;
pub mod error;
pub mod http_transport;
pub mod manager;
pub mod server;
pub mod tool_bridge;
pub mod traits;
pub mod transport;
pub mod types;

pub use {
    client::{McpClient, McpClientState},
    error::{Error, McpTransportError, Result},
    manager::{McpManager, ServerStatus},
    server::McpServer,
    tool_bridge::McpToolBridge,
    traits::{McpTransport, ToolCaller},
};
