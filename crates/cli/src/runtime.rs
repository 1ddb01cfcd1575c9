//! Wiring shared by every command: the tool registry (built-in plus remote
//! MCP tools), the model provider and per-session compaction.

use std::{path::PathBuf, sync::Arc};

use {
    agentwire_agents::{
        AgentSession, RunnerEvent, SessionOptions, ToolRegistry,
        compaction::{CompactionOptions, HistoryCompactor},
        providers,
        summary_store::JsonlSummaryStore,
    },
    agentwire_config::AgentwireConfig,
    agentwire_mcp::McpManager,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::calculator::CalculatorTool;

pub struct Runtime {
    pub config: AgentwireConfig,
    pub tools: Arc<ToolRegistry>,
    pub mcp: McpManager,
}

impl Runtime {
    /// Register the built-in tools, then connect every enabled MCP server
    /// and add its tools. Servers that fail to start are skipped.
    pub async fn start(config: AgentwireConfig) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CalculatorTool));

        let mut mcp = McpManager::new(config.mcp.clone());
        let started = mcp.start_enabled().await;
        let remote = mcp.register_tools(&mut registry);
        if !started.is_empty() {
            info!(servers = ?started, tools = remote, "MCP servers connected");
        }

        Self {
            config,
            tools: Arc::new(registry),
            mcp,
        }
    }

    /// A fresh session over the shared registry. With compaction enabled the
    /// latest persisted summary is restored into it.
    pub async fn session(
        &self,
        cancel: CancellationToken,
        verbose: bool,
    ) -> anyhow::Result<AgentSession> {
        let provider = providers::from_config(&self.config.model)?;
        let mut session = AgentSession::new(
            provider,
            Arc::clone(&self.tools),
            SessionOptions::from(&self.config),
        )
        .with_cancellation(cancel);
        if verbose {
            session = session.with_event_handler(Box::new(print_event));
        }

        if self.config.compaction.enabled {
            let store = JsonlSummaryStore::new(summary_path(&self.config));
            let compactor =
                HistoryCompactor::new(CompactionOptions::from(&self.config), Arc::new(store));
            session = session.with_compactor(compactor);
            match session.restore_latest_summary().await {
                Ok(true) => eprintln!("(restored summary of an earlier conversation)"),
                Ok(false) => {},
                Err(e) => warn!(error = %e, "could not restore conversation summary"),
            }
        }
        Ok(session)
    }

    pub async fn shutdown(mut self) {
        self.mcp.shutdown_all().await;
    }
}

/// Where compaction summaries are persisted.
pub fn summary_path(config: &AgentwireConfig) -> PathBuf {
    config
        .compaction
        .summary_path
        .clone()
        .unwrap_or_else(|| agentwire_config::data_dir().join("summaries.jsonl"))
}

/// Progress goes to stderr so stdout carries only answers.
fn print_event(event: RunnerEvent) {
    match event {
        RunnerEvent::ToolCallStart {
            name, arguments, ..
        } => eprintln!("  -> {name} {arguments}"),
        RunnerEvent::ToolCallEnd {
            name,
            success: false,
            error,
            ..
        } => eprintln!("  !! {name}: {}", error.unwrap_or_default()),
        RunnerEvent::ThinkingText(text) => eprintln!("  .. {}", text.trim()),
        RunnerEvent::Compacted { covered_turns } => {
            eprintln!("  (compacted {covered_turns} earlier turns into a summary)");
        },
        RunnerEvent::Iteration(_)
        | RunnerEvent::Thinking
        | RunnerEvent::ThinkingDone
        | RunnerEvent::ToolCallEnd { .. } => {},
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_summary_path_wins() {
        let mut config = AgentwireConfig::default();
        config.compaction.summary_path = Some(PathBuf::from("/tmp/agentwire/s.jsonl"));
        assert_eq!(summary_path(&config), PathBuf::from("/tmp/agentwire/s.jsonl"));

        config.compaction.summary_path = None;
        assert!(summary_path(&config).ends_with("summaries.jsonl"));
    }

    #[tokio::test]
    async fn builtin_calculator_is_registered() {
        let runtime = Runtime::start(AgentwireConfig::default()).await;
        assert_eq!(runtime.tools.tool_names(), vec!["calculator".to_string()]);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn session_restores_persisted_summary() {
        use agentwire_agents::summary_store::SummaryStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");
        JsonlSummaryStore::new(&path)
            .save("user asked about 2+2", 2)
            .await
            .unwrap();

        let mut config = AgentwireConfig::default();
        config.compaction.summary_path = Some(path);
        let runtime = Runtime::start(config).await;
        let session = runtime
            .session(CancellationToken::new(), false)
            .await
            .unwrap();
        assert_eq!(session.conversation().len(), 2);
        runtime.shutdown().await;
    }
}
