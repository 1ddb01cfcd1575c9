//! One JSON-RPC endpoint over HTTP POST.

use std::{future::Future, net::SocketAddr};

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
    },
    tokio::net::TcpListener,
    tracing::info,
};

use super::McpServer;

/// Router with the endpoint mounted at `path`.
pub fn router(server: McpServer, path: &str) -> Router {
    Router::new()
        .route(path, post(rpc_handler))
        .with_state(server)
}

/// Bind `addr` and serve until `shutdown` resolves. Returns once the
/// listener is closed.
pub async fn serve_http<F>(
    server: McpServer,
    addr: SocketAddr,
    path: &str,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, path = %path, "MCP HTTP server listening");
    axum::serve(listener, router(server, path))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// The body is taken as a raw string so malformed JSON is answered with a
/// JSON-RPC parse error rather than an HTTP rejection.
async fn rpc_handler(State(server): State<McpServer>, body: String) -> Response {
    match server.handle_raw(&body).await {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        agentwire_agents::ToolRegistry,
        axum::body::{Body, to_bytes},
        std::sync::Arc,
        tower::ServiceExt,
    };

    fn app() -> Router {
        router(McpServer::new(Arc::new(ToolRegistry::new())), "/mcp")
    }

    fn post_json(body: &'static str) -> http::Request<Body> {
        http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn request_gets_json_response() {
        let response = app()
            .oneshot(post_json(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}));
    }

    #[tokio::test]
    async fn notification_gets_202_and_empty_body() {
        let response = app()
            .oneshot(post_json(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error_with_200() {
        let response = app().oneshot(post_json("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], -32700);
        assert_eq!(json["id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn other_paths_are_not_served() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/other")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
