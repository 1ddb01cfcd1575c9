//! Agent runtime: conversation model, tool registry, tool-call recovery,
//! history compaction and the agent loop.

pub mod compaction;
pub mod conversation;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod runner;
pub mod summary_store;
pub mod tool_parsing;
pub mod tool_registry;

pub use {
    conversation::ConversationStore,
    model::{ConversationItem, LlmProvider, ToolCall},
    runner::{AgentRunError, AgentSession, RunnerEvent, SessionOptions, TurnOutcome},
    tool_registry::{AgentTool, ToolManifestEntry, ToolRegistry, TransportFailure},
};
