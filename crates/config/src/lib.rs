//! Configuration loading, env substitution, env overrides and validation.
//!
//! Config files: `agentwire.toml`, `agentwire.yaml`, or `agentwire.json`
//! Searched in `./` then `~/.config/agentwire/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config,
    },
    schema::{
        AgentConfig, AgentwireConfig, CompactionConfig, McpConfig, McpServerEntry, ModelConfig,
        RetrievalConfig, SUMMARY_NOTE_PREFIX, ServerConfig, TransportKind,
    },
    validate::{Diagnostic, Severity, validate},
};
