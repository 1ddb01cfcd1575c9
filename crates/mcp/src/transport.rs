//! Stdio transport: JSON-RPC over a child process's stdin/stdout, one JSON
//! value per line.

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
        process::{Child, Command},
        sync::{Mutex, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    codec::{correlation_key, decode_response, encode_line},
    error::{Context, McpTransportError, Result},
    traits::McpTransport,
    types::{JsonRpcRequest, JsonRpcResponse},
};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-delimited JSON-RPC over a pair of byte streams, usually a child
/// process's stdout/stdin.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    writer: Mutex<BoxedWriter>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    timeout: Duration,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process and start the reader loop.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Arc<Self>> {
        info!(command = %command, args = ?args, "spawning MCP server process");

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn MCP server: {command}"))?;

        let stdin = child.stdin.take().context("failed to capture stdin")?;
        let stdout = child.stdout.take().context("failed to capture stdout")?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(stderr = %trimmed, "MCP server stderr");
                    }
                }
            });
        }

        let transport = Self::build(stdout, Box::new(stdin), timeout);
        *transport.child.lock().await = Some(child);
        Ok(transport)
    }

    /// Run over arbitrary streams, e.g. an in-memory duplex pipe.
    pub fn from_streams<R, W>(reader: R, writer: W, timeout: Duration) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(reader, Box::new(writer), timeout)
    }

    fn build<R>(reader: R, writer: BoxedWriter, timeout: Duration) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(read_responses(
            reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));
        Arc::new(Self {
            child: Mutex::new(None),
            writer: Mutex::new(writer),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            timeout,
            reader_handle: Mutex::new(Some(handle)),
        })
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Route each response line to the request waiting on its id. On EOF every
/// waiter is dropped, which its caller sees as a closed connection.
async fn read_responses<R>(reader: R, pending: PendingMap, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                trace!(raw = %trimmed, "MCP server -> client");
                match decode_response(trimmed) {
                    Ok(resp) => {
                        let key = correlation_key(&resp.id);
                        if let Some(tx) = pending.lock().await.remove(&key) {
                            let _ = tx.send(resp);
                        } else {
                            warn!(id = %key, "received response for unknown request id");
                        }
                    },
                    Err(e) => {
                        debug!(error = %e, line = %trimmed, "MCP server sent non-response line");
                    },
                }
            },
            Ok(None) => {
                debug!("MCP server stdout closed");
                break;
            },
            Err(e) => {
                warn!(error = %e, "error reading from MCP server stdout");
                break;
            },
        }
    }
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

#[async_trait::async_trait]
impl McpTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpTransportError::Closed.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let key = correlation_key(&serde_json::Value::from(id));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        debug!(method = %method, id, "client -> MCP server");
        if let Err(e) = self.write_line(&encode_line(&req)?).await {
            self.pending.lock().await.remove(&key);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpTransportError::Closed.into()),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                warn!(method = %method, id, secs = self.timeout.as_secs(), "MCP request timed out");
                Err(McpTransportError::Timeout {
                    method: method.into(),
                    secs: self.timeout.as_secs(),
                }
                .into())
            },
        }
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpTransportError::Closed.into());
        }
        trace!(method = %method, "client -> MCP server (notification)");
        self.write_line(&encode_line(&JsonRpcRequest::notification(method, params))?)
            .await
    }

    async fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        self.pending.lock().await.clear();
        let _ = self.writer.lock().await.shutdown().await;
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}
