//! Semantic checks over a loaded [`AgentwireConfig`].

use crate::schema::{AgentwireConfig, TransportKind};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "range", "mcp", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "agent.max_iterations"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Check a config for values the runtime cannot honor. Sorted by severity.
pub fn validate(config: &AgentwireConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_model(config, &mut diagnostics);
    check_loop(config, &mut diagnostics);
    check_mcp_servers(config, &mut diagnostics);
    check_server(config, &mut diagnostics);
    diagnostics.sort_by_key(|d| d.severity);
    diagnostics
}

fn check_model(config: &AgentwireConfig, diagnostics: &mut Vec<Diagnostic>) {
    let url = &config.model.base_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "model.base_url",
            format!("\"{url}\" is not an http(s) URL"),
        ));
    }
    if config.model.model.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "model.model",
            "model name is empty",
        ));
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "model.temperature",
            format!(
                "temperature {} is outside the usual 0.0..=2.0 range",
                config.model.temperature
            ),
        ));
    }
    if config.model.timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "model.timeout_secs",
            "timeout must be at least one second",
        ));
    }
}

fn check_loop(config: &AgentwireConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.agent.max_iterations == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "agent.max_iterations",
            "at least one model call per turn is required",
        ));
    }
    let compaction = &config.compaction;
    if compaction.enabled && compaction.threshold == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "compaction.threshold",
            "threshold must be at least 1 when compaction is enabled",
        ));
    }
    if compaction.enabled && compaction.keep_last == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "compaction.keep_last",
            "keep_last = 0 drops every verbatim item on compaction",
        ));
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "retrieval.min_similarity",
            "similarity must be within 0.0..=1.0",
        ));
    }
}

fn check_mcp_servers(config: &AgentwireConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.mcp.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "mcp",
            "mcp.request_timeout_secs",
            "request timeout must be at least one second",
        ));
    }
    let mut names: Vec<&String> = config.mcp.servers.keys().collect();
    names.sort();
    for name in names {
        let entry = &config.mcp.servers[name];
        let path = format!("mcp.servers.{name}");
        if name.contains("__") {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "mcp",
                &path,
                "server names may not contain \"__\" (used as the tool name separator)",
            ));
        }
        match entry.transport {
            TransportKind::Stdio if entry.command.trim().is_empty() => {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "mcp",
                    format!("{path}.command"),
                    "stdio transport requires a command",
                ));
            },
            TransportKind::Http if entry.url.as_deref().is_none_or(str::is_empty) => {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "mcp",
                    format!("{path}.url"),
                    "http transport requires a url",
                ));
            },
            _ => {},
        }
        if !entry.enabled {
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                "mcp",
                &path,
                "server is disabled",
            ));
        }
    }
}

fn check_server(config: &AgentwireConfig, diagnostics: &mut Vec<Diagnostic>) {
    if !config.server.path.starts_with('/') {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "server.path",
            "endpoint path must start with '/'",
        ));
    }
    let bind = config.server.bind.as_str();
    if !matches!(bind, "127.0.0.1" | "localhost" | "::1") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "server.bind",
            format!("protocol server has no authentication and binds to {bind}"),
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::McpServerEntry};

    fn entry(transport: TransportKind) -> McpServerEntry {
        McpServerEntry {
            transport,
            command: String::new(),
            args: Vec::new(),
            env: Default::default(),
            url: None,
            enabled: true,
        }
    }

    #[test]
    fn default_config_is_clean() {
        assert!(validate(&AgentwireConfig::default()).is_empty());
    }

    #[test]
    fn zero_iterations_is_an_error() {
        let mut cfg = AgentwireConfig::default();
        cfg.agent.max_iterations = 0;
        let diags = validate(&cfg);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].path, "agent.max_iterations");
    }

    #[test]
    fn mcp_entries_need_their_endpoint() {
        let mut cfg = AgentwireConfig::default();
        cfg.mcp
            .servers
            .insert("files".into(), entry(TransportKind::Stdio));
        cfg.mcp
            .servers
            .insert("web".into(), entry(TransportKind::Http));
        let paths: Vec<_> = validate(&cfg).into_iter().map(|d| d.path).collect();
        assert!(paths.contains(&"mcp.servers.files.command".to_string()));
        assert!(paths.contains(&"mcp.servers.web.url".to_string()));
    }

    #[test]
    fn errors_sort_before_warnings() {
        let mut cfg = AgentwireConfig::default();
        cfg.server.bind = "0.0.0.0".into();
        cfg.server.path = "mcp".into();
        let diags = validate(&cfg);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[1].severity, Severity::Warning);
        assert_eq!(diags[1].category, "security");
    }
}
