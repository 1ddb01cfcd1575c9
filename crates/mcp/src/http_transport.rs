//! HTTP transport: one POST per JSON-RPC message to a fixed endpoint, reply
//! body = response. No connection state is kept between requests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    reqwest::Client,
    tracing::{debug, warn},
};

use crate::{
    error::{Context, Error, McpTransportError, Result},
    traits::McpTransport,
    types::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION},
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

pub struct HttpTransport {
    client: Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Arc<Self>> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for MCP transport")?;
        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            timeout,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }))
    }

    async fn post(&self, method: &str, body: &JsonRpcRequest) -> Result<reqwest::Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpTransportError::Closed.into());
        }
        let resp = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(method, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(method = %method, %status, url = %self.url, "MCP HTTP server returned error status");
            return Err(McpTransportError::HttpStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(resp)
    }

    fn map_send_error(&self, method: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            McpTransportError::Timeout {
                method: method.into(),
                secs: self.timeout.as_secs(),
            }
            .into()
        } else {
            e.into()
        }
    }
}

#[async_trait::async_trait]
impl McpTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        debug!(method = %method, id, url = %self.url, "HTTP client -> server");

        let http_resp = self.post(method, &req).await?;
        let body = http_resp
            .text()
            .await
            .map_err(|e| self.map_send_error(method, e))?;
        let resp: JsonRpcResponse = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse JSON-RPC response for '{method}'"))?;
        if resp.id != serde_json::Value::from(id) {
            warn!(method = %method, id, got = %resp.id, "MCP HTTP reply for a different request");
            return Err(McpTransportError::MismatchedId {
                expected: id,
                got: resp.id,
            }
            .into());
        }
        Ok(resp)
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        debug!(method = %method, url = %self.url, "HTTP client -> server (notification)");
        self.post(method, &JsonRpcRequest::notification(method, params))
            .await?;
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
