use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::tool_registry::ToolManifestEntry;

// ── Conversation items ──────────────────────────────────────────────────────

/// One typed entry of a conversation.
///
/// Every `ToolInvocation` is followed, before the next `UserTurn`, by exactly
/// one `ToolResult` carrying the same `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationItem {
    SystemNote {
        content: String,
    },
    UserTurn {
        content: String,
    },
    AssistantTurn {
        content: String,
    },
    ToolInvocation {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

impl ConversationItem {
    pub fn system(content: impl Into<String>) -> Self {
        Self::SystemNote {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::UserTurn {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::AssistantTurn {
            content: content.into(),
        }
    }

    pub fn invocation(call: &ToolCall) -> Self {
        Self::ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SystemNote { .. } => "system_note",
            Self::UserTurn { .. } => "user_turn",
            Self::AssistantTurn { .. } => "assistant_turn",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::ToolResult { .. } => "tool_result",
        }
    }

    /// Convert to the chat-message JSON shape shared by Ollama and
    /// OpenAI-compatible endpoints.
    #[must_use]
    pub fn to_chat_value(&self) -> serde_json::Value {
        match self {
            Self::SystemNote { content } => {
                serde_json::json!({ "role": "system", "content": content })
            },
            Self::UserTurn { content } => {
                serde_json::json!({ "role": "user", "content": content })
            },
            Self::AssistantTurn { content } => {
                serde_json::json!({ "role": "assistant", "content": content })
            },
            Self::ToolInvocation {
                call_id,
                name,
                arguments,
            } => serde_json::json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments },
                }],
            }),
            Self::ToolResult { call_id, content } => serde_json::json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content,
            }),
        }
    }
}

// ── Provider interface ──────────────────────────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One item of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Message(String),
    ToolCall(ToolCall),
}

/// Response from a model completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub outputs: Vec<ModelOutput>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// A response holding a single text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            outputs: vec![ModelOutput::Message(text.into())],
            usage: Usage::default(),
        }
    }

    /// A response holding structured tool calls only.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            outputs: calls.into_iter().map(ModelOutput::ToolCall).collect(),
            usage: Usage::default(),
        }
    }

    /// Concatenated text of every message output, if any is non-blank.
    #[must_use]
    pub fn joined_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .outputs
            .iter()
            .filter_map(|o| match o {
                ModelOutput::Message(text) if !text.trim().is_empty() => Some(text.trim()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Model provider. Treated as a blocking request/response function.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Model identifier (e.g. "llama3.2").
    fn id(&self) -> &str;

    async fn complete(
        &self,
        items: &[ConversationItem],
        manifest: &[ToolManifestEntry],
        temperature: f32,
    ) -> anyhow::Result<CompletionResponse>;

    /// Whether the provider forwards the manifest as native tool definitions.
    /// Providers that don't rely on the system prompt and text recovery.
    fn supports_tools(&self) -> bool {
        false
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_serialize_with_kind_tag() {
        let item = ConversationItem::tool_result("call_1", "4");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "tool_result");
        assert_eq!(json["call_id"], "call_1");
    }

    #[test]
    fn invocation_to_chat_value_carries_tool_call() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: serde_json::json!({ "expression": "2+2" }),
        };
        let value = ConversationItem::invocation(&call).to_chat_value();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "calculator");
        assert_eq!(
            value["tool_calls"][0]["function"]["arguments"]["expression"],
            "2+2"
        );
    }

    #[test]
    fn tool_result_to_chat_value() {
        let value = ConversationItem::tool_result("call_1", "4").to_chat_value();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert_eq!(value["content"], "4");
    }

    #[test]
    fn joined_text_skips_blank_messages() {
        let resp = CompletionResponse {
            outputs: vec![
                ModelOutput::Message("  ".into()),
                ModelOutput::Message("hello".into()),
            ],
            usage: Usage::default(),
        };
        assert_eq!(resp.joined_text().as_deref(), Some("hello"));
        assert!(CompletionResponse::default().joined_text().is_none());
    }
}
