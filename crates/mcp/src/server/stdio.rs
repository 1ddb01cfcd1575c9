//! Line-delimited JSON-RPC over a pair of streams (normally stdin/stdout).
//!
//! The output stream carries protocol lines only; logging goes elsewhere.

use {
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    tracing::{debug, info},
};

use {
    super::McpServer,
    crate::{codec::encode_line, error::Result},
};

/// Serve requests one at a time until the input reaches EOF.
pub async fn serve_stdio<R, W>(server: &McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("MCP stdio server ready");
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!(raw = %trimmed, "MCP client -> server");
        if let Some(resp) = server.handle_raw(trimmed).await {
            writer.write_all(encode_line(&resp)?.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    info!("MCP stdio input closed");
    Ok(())
}
