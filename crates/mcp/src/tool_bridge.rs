//! Remote tools as [`AgentTool`]s, so the agent loop calls them exactly like
//! local ones.

use std::sync::Arc;

use {
    agentwire_agents::{AgentTool, TransportFailure},
    async_trait::async_trait,
    tracing::debug,
};

use crate::{traits::ToolCaller, types::McpToolDef};

/// Separator between the parts of a bridged tool name.
pub const NAME_SEPARATOR: &str = "__";

/// Registry name of a remote tool: `mcp__<server>__<tool>`.
pub fn prefixed_tool_name(server: &str, tool: &str) -> String {
    format!("mcp{NAME_SEPARATOR}{server}{NAME_SEPARATOR}{tool}")
}

/// One remote tool, invoked through a [`ToolCaller`].
pub struct McpToolBridge {
    prefixed_name: String,
    original_name: String,
    description: String,
    input_schema: serde_json::Value,
    caller: Arc<dyn ToolCaller>,
}

impl McpToolBridge {
    pub fn new(tool_def: &McpToolDef, caller: Arc<dyn ToolCaller>) -> Self {
        Self {
            prefixed_name: prefixed_tool_name(caller.server_name(), &tool_def.name),
            original_name: tool_def.name.clone(),
            description: tool_def
                .description
                .clone()
                .unwrap_or_else(|| format!("MCP tool: {}", tool_def.name)),
            input_schema: tool_def.input_schema.clone(),
            caller,
        }
    }

    /// Bridges for every tool of one server.
    pub fn from_tools(tools: &[McpToolDef], caller: &Arc<dyn ToolCaller>) -> Vec<Self> {
        tools
            .iter()
            .map(|t| Self::new(t, Arc::clone(caller)))
            .collect()
    }

    pub fn server_name(&self) -> &str {
        self.caller.server_name()
    }
}

#[async_trait]
impl AgentTool for McpToolBridge {
    fn name(&self) -> &str {
        &self.prefixed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.input_schema.clone()
    }

    /// Returns the server's text even when it flags `isError`; only a failed
    /// channel is an error, surfaced as [`TransportFailure`].
    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<String> {
        let result = match self.caller.call_tool(&self.original_name, params).await {
            Ok(result) => result,
            Err(e) if e.is_transport_failure() => {
                return Err(TransportFailure(format!(
                    "{} ({}): {e}",
                    self.original_name,
                    self.caller.server_name()
                ))
                .into());
            },
            Err(e) => return Err(e.into()),
        };

        let text = result.joined_text();
        debug!(
            tool = %self.prefixed_name,
            is_error = result.is_error,
            blocks = result.content.len(),
            "MCP tool returned"
        );
        Ok(text)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::{Error, McpTransportError, Result},
            types::{ToolContent, ToolsCallResult},
        },
        serde_json::{Value, json},
    };

    struct FixedCaller(std::result::Result<ToolsCallResult, fn() -> Error>);

    #[async_trait]
    impl ToolCaller for FixedCaller {
        fn server_name(&self) -> &str {
            "files"
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<ToolsCallResult> {
            assert_eq!(name, "read");
            match &self.0 {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn bridge(caller: FixedCaller) -> McpToolBridge {
        let def = McpToolDef {
            name: "read".into(),
            description: None,
            input_schema: json!({"type": "object"}),
        };
        McpToolBridge::new(&def, Arc::new(caller))
    }

    #[test]
    fn names_carry_server_prefix() {
        assert_eq!(prefixed_tool_name("my-server", "read_file"), "mcp__my-server__read_file");
    }

    #[tokio::test]
    async fn manifest_fields_come_from_definition() {
        let b = bridge(FixedCaller(Ok(ToolsCallResult::text("x"))));
        assert_eq!(b.name(), "mcp__files__read");
        assert_eq!(b.description(), "MCP tool: read");
        assert_eq!(b.parameters_schema(), json!({"type": "object"}));
    }

    #[tokio::test]
    async fn text_blocks_are_joined_and_others_dropped() {
        let b = bridge(FixedCaller(Ok(ToolsCallResult {
            content: vec![
                ToolContent::Text { text: "a".into() },
                ToolContent::Image {
                    data: "AA==".into(),
                    mime_type: "image/png".into(),
                },
                ToolContent::Text { text: "b".into() },
            ],
            is_error: false,
        })));
        assert_eq!(b.execute(json!({})).await.unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn is_error_returns_text_instead_of_failing() {
        let b = bridge(FixedCaller(Ok(ToolsCallResult::error("bad args"))));
        assert_eq!(b.execute(json!({})).await.unwrap(), "bad args");
    }

    #[tokio::test]
    async fn channel_failure_becomes_transport_failure() {
        let b = bridge(FixedCaller(Err(|| McpTransportError::Closed.into())));
        let err = b.execute(json!({})).await.unwrap_err();
        assert!(err.downcast_ref::<TransportFailure>().is_some());
    }

    #[tokio::test]
    async fn rpc_error_is_an_ordinary_tool_error() {
        let b = bridge(FixedCaller(Err(|| {
            McpTransportError::Rpc {
                code: -32602,
                message: "invalid params".into(),
            }
            .into()
        })));
        let err = b.execute(json!({})).await.unwrap_err();
        assert!(err.downcast_ref::<TransportFailure>().is_none());
        assert!(err.to_string().contains("invalid params"));
    }
}
