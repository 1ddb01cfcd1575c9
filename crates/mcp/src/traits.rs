//! Seams between the protocol client and what carries or consumes it.

use {async_trait::async_trait, serde_json::Value};

use crate::{
    error::Result,
    types::{JsonRpcResponse, ToolsCallResult},
};

/// One JSON-RPC channel to a server: a child process's stdio or an HTTP
/// endpoint. Requests are correlated purely by id.
///
/// Every exchange is bounded: implementations fail with
/// `McpTransportError::Timeout` rather than wait forever.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response. A response carrying an
    /// error object is returned as-is; callers decide how to surface it.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a notification. Nothing is awaited beyond the write.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    async fn is_alive(&self) -> bool;

    /// Release the channel. Idempotent.
    async fn close(&self);
}

/// Anything that can run a named tool on a remote server.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    fn server_name(&self) -> &str;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult>;
}
