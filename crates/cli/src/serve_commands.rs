use std::{net::SocketAddr, sync::Arc};

use {
    agentwire_mcp::{
        McpServer,
        server::{serve_http, serve_stdio},
    },
    anyhow::{Context, Result},
    clap::ValueEnum,
    tokio::io::BufReader,
};

use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServeTransport {
    /// One JSON-RPC endpoint over HTTP POST.
    Http,
    /// One JSON value per line over stdin/stdout.
    Stdio,
}

/// Expose every registered tool, built-in and remote, to MCP clients.
pub async fn serve(
    runtime: &Runtime,
    transport: ServeTransport,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let server = McpServer::new(Arc::clone(&runtime.tools));
    match transport {
        ServeTransport::Http => {
            let settings = &runtime.config.server;
            let addr = listen_addr(
                bind.as_deref().unwrap_or(&settings.bind),
                port.unwrap_or(settings.port),
            )?;
            serve_http(server, addr, &settings.path, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        },
        ServeTransport::Stdio => {
            serve_stdio(&server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
        },
    }
    Ok(())
}

fn listen_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    let host = if bind.contains(':') && !bind.starts_with('[') {
        format!("[{bind}]")
    } else {
        bind.to_string()
    };
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {bind}:{port}"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_accepts_v4_and_v6() {
        assert_eq!(
            listen_addr("127.0.0.1", 8765).unwrap(),
            "127.0.0.1:8765".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(listen_addr("::1", 9000).unwrap().port(), 9000);
        assert!(listen_addr("::1", 9000).unwrap().is_ipv6());
        assert!(listen_addr("localhost", 80).is_err());
    }
}
