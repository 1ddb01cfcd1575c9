pub mod ollama;

use std::{sync::Arc, time::Duration};

use agentwire_config::ModelConfig;

use crate::model::LlmProvider;

/// Build the configured model provider.
pub fn from_config(config: &ModelConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let provider = ollama::OllamaProvider::new(
        &config.base_url,
        &config.model,
        Duration::from_secs(config.timeout_secs.max(1)),
    )?
    .with_api_key(config.api_key.clone());
    Ok(Arc::new(provider))
}

/// Split a leading `<think>...</think>` block off model text.
/// Returns `(visible, thinking)`.
pub(crate) fn strip_think_tags(text: &str) -> (String, Option<String>) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix(OPEN) else {
        return (text.to_string(), None);
    };
    match rest.find(CLOSE) {
        Some(end) => {
            let thinking = rest[..end].trim().to_string();
            let visible = rest[end + CLOSE.len()..].trim().to_string();
            (visible, (!thinking.is_empty()).then_some(thinking))
        },
        // Unterminated block: the whole reply is reasoning.
        None => (String::new(), Some(rest.trim().to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_think_block() {
        let (visible, thinking) = strip_think_tags("<think>add them</think>\nThe answer is 4.");
        assert_eq!(visible, "The answer is 4.");
        assert_eq!(thinking.as_deref(), Some("add them"));
    }

    #[test]
    fn leaves_plain_text_alone() {
        let (visible, thinking) = strip_think_tags("no reasoning here");
        assert_eq!(visible, "no reasoning here");
        assert!(thinking.is_none());
    }

    #[test]
    fn builds_provider_from_default_config() {
        let provider = from_config(&ModelConfig::default());
        assert!(provider.is_ok_and(|p| p.id() == agentwire_config::schema::DEFAULT_MODEL));
    }
}
