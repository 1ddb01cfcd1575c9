use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Serialize,
    std::{collections::HashMap, sync::Arc},
};

/// Agent-callable tool.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    /// Run the tool. The returned text becomes the tool result verbatim.
    async fn execute(&self, params: serde_json::Value) -> Result<String>;
}

/// Returned (inside `anyhow::Error`) by tools whose channel to the real
/// implementation broke, as opposed to the tool itself failing.
#[derive(Debug, thiserror::Error)]
#[error("tool transport failed: {0}")]
pub struct TransportFailure(pub String);

/// Name, description and parameter schema of one tool, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolManifestEntry {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolManifestEntry {
    /// Native function-calling shape (`{"type":"function","function":{..}}`).
    #[must_use]
    pub fn to_function_value(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Registry of available tools.
///
/// Built once and then shared read-only (`Arc<ToolRegistry>`) across sessions.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn AgentTool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::from(tool)).is_some() {
            tracing::debug!(tool = %name, "replaced existing tool registration");
        }
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&dyn AgentTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Manifest entries sorted by name.
    pub fn manifest(&self) -> Vec<ToolManifestEntry> {
        let mut entries: Vec<ToolManifestEntry> = self
            .tools
            .values()
            .map(|t| ToolManifestEntry {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Sorted list of tool names.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl AgentTool for Echo {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn execute(&self, _params: serde_json::Value) -> Result<String> {
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn registration_is_last_write_wins() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(Echo {
            name: "echo",
            reply: "first",
        }));
        reg.register(Box::new(Echo {
            name: "echo",
            reply: "second",
        }));
        assert_eq!(reg.len(), 1);
        let out = reg
            .get("echo")
            .unwrap()
            .execute(serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out, "second");
    }

    #[test]
    fn manifest_is_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(Echo {
            name: "zeta",
            reply: "",
        }));
        reg.register(Box::new(Echo {
            name: "alpha",
            reply: "",
        }));
        let manifest = reg.manifest();
        assert_eq!(manifest[0].name, "alpha");
        assert_eq!(manifest[1].name, "zeta");
        assert_eq!(manifest[0].parameters["type"], "object");
        assert_eq!(
            manifest[0].to_function_value()["function"]["name"],
            "alpha"
        );
    }

    #[test]
    fn unregister_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(Echo {
            name: "echo",
            reply: "",
        }));
        assert!(reg.unregister("echo"));
        assert!(!reg.unregister("echo"));
        assert!(reg.get("echo").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn transport_failure_survives_anyhow() {
        let err: anyhow::Error = TransportFailure("pipe closed".into()).into();
        assert!(err.downcast_ref::<TransportFailure>().is_some());
        assert_eq!(err.to_string(), "tool transport failed: pipe closed");
    }
}
