/// Config schema types (model, agent loop, compaction, retrieval, mcp, server).
use std::{collections::HashMap, path::PathBuf};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Default model endpoint when nothing is configured (local Ollama).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";
/// Default model name.
pub const DEFAULT_MODEL: &str = "llama3.2";
/// Prefix of the SystemNote that carries a compaction summary.
pub const SUMMARY_NOTE_PREFIX: &str = "summary of earlier conversation: ";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentwireConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub compaction: CompactionConfig,
    pub retrieval: RetrievalConfig,
    pub mcp: McpConfig,
    pub server: ServerConfig,
}

/// Model provider connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API root, e.g. `http://localhost:11434/api`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on one model request.
    pub timeout_secs: u64,
    /// Bearer token for proxies in front of the model server.
    #[serde(default, skip_serializing)]
    pub api_key: Option<Secret<String>>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.2,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Tool-calling iterations allowed per user turn.
    pub max_iterations: usize,
    /// Recover tool calls the model wrote as prose instead of structured calls.
    pub enable_text_mined_tool_calls: bool,
    /// Stop sending the capability manifest once a tool has been called in the turn.
    pub suppress_manifest_after_first_call: bool,
    /// Maximum bytes for a single tool result before truncation. Default 50KB.
    pub max_tool_result_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant. Use the available tools when they help \
                            answer the user, then reply concisely."
                .into(),
            max_iterations: 3,
            enable_text_mined_tool_calls: true,
            suppress_manifest_after_first_call: false,
            max_tool_result_bytes: 50_000,
        }
    }
}

/// History compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    /// User turns since the last compaction before a new one is attempted.
    pub threshold: usize,
    /// Items kept verbatim at the end of the conversation.
    pub keep_last: usize,
    pub summary_prompt: String,
    /// JSONL file that receives every summary checkpoint. In-memory when unset.
    pub summary_path: Option<PathBuf>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            keep_last: 6,
            summary_prompt: "Summarize the following conversation in a few sentences. Keep \
                             names, numbers, decisions and tool results the user may ask about \
                             again. Reply with the summary only."
                .into(),
            summary_path: None,
        }
    }
}

/// Retrieval injection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub limit: usize,
    pub min_similarity: f32,
    /// Shorter inputs ("hi", "thanks") skip retrieval.
    pub min_query_words: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 3,
            min_similarity: 0.5,
            min_query_words: 3,
        }
    }
}

/// MCP (Model Context Protocol) server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Bounded wait for every request/response exchange.
    pub request_timeout_secs: u64,
    /// Configured MCP servers, keyed by server name.
    pub servers: HashMap<String, McpServerEntry>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            servers: HashMap::new(),
        }
    }
}

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process, newline-delimited JSON over stdin/stdout.
    #[default]
    Stdio,
    /// One HTTP POST per request.
    Http,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    #[serde(default)]
    pub transport: TransportKind,
    /// Command to spawn the server process (stdio transport).
    #[serde(default)]
    pub command: String,
    /// Arguments to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL. Required when `transport` is "http".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Protocol server (peer role) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// Path of the single JSON-RPC endpoint.
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8765,
            path: "/mcp".into(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AgentwireConfig::default();
        assert_eq!(cfg.agent.max_iterations, 3);
        assert!(cfg.agent.enable_text_mined_tool_calls);
        assert!(!cfg.agent.suppress_manifest_after_first_call);
        assert_eq!(cfg.compaction.threshold, 3);
        assert_eq!(cfg.compaction.keep_last, 6);
        assert_eq!(cfg.model.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.server.path, "/mcp");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AgentwireConfig = toml::from_str(
            r#"
            [agent]
            max_iterations = 5

            [mcp.servers.weather]
            transport = "http"
            url = "http://127.0.0.1:9000/mcp"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.max_iterations, 5);
        assert!(cfg.agent.enable_text_mined_tool_calls);
        let entry = &cfg.mcp.servers["weather"];
        assert_eq!(entry.transport, TransportKind::Http);
        assert!(entry.enabled);
        assert_eq!(cfg.mcp.request_timeout_secs, 30);
    }

    #[test]
    fn api_key_is_never_serialized() {
        let mut cfg = AgentwireConfig::default();
        cfg.model.api_key = Some(Secret::new("sk-test".into()));
        let out = toml::to_string(&cfg).unwrap();
        assert!(!out.contains("sk-test"));
    }
}
