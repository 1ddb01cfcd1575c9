//! Framing and parsing of JSON-RPC messages.
//!
//! Both transports carry one JSON value per message: one HTTP body, or one
//! newline-terminated line on a pipe.

use serde::Serialize;

use crate::{
    error::Result,
    types::{
        INVALID_REQUEST, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
        PARSE_ERROR,
    },
};

/// Serialize `msg` as one newline-terminated line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Parse one inbound request.
///
/// Undecodable JSON yields a `-32700` response; JSON that is not a request
/// object yields `-32600`. Both carry a `null` id since the original could
/// not be read.
pub fn decode_request(raw: &str) -> std::result::Result<JsonRpcRequest, JsonRpcResponse> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        JsonRpcResponse::failure(
            serde_json::Value::Null,
            JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
        )
    })?;
    let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::failure(
            id.clone(),
            JsonRpcError::new(INVALID_REQUEST, format!("invalid request: {e}")),
        )
    })?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(
                INVALID_REQUEST,
                format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            ),
        ));
    }
    Ok(request)
}

/// Parse one inbound response line.
pub fn decode_response(raw: &str) -> Result<JsonRpcResponse> {
    Ok(serde_json::from_str(raw)?)
}

/// Key used to correlate a response with its pending request.
pub fn correlation_key(id: &serde_json::Value) -> String {
    id.to_string()
}
