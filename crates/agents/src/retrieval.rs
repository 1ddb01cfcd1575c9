//! Retrieval seam: external search results injected as context.

use std::fmt::Write;

use {async_trait::async_trait, serde::Serialize};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub text: String,
    pub source: String,
    pub title: String,
    pub similarity: f32,
}

/// Knowledge search collaborator (embeddings, full-text, anything).
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> anyhow::Result<Vec<RetrievedContext>>;
}

/// Retrieval parameters for a session.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub min_similarity: f32,
    pub min_query_words: usize,
}

impl From<&agentwire_config::RetrievalConfig> for RetrievalOptions {
    fn from(cfg: &agentwire_config::RetrievalConfig) -> Self {
        Self {
            limit: cfg.limit,
            min_similarity: cfg.min_similarity,
            min_query_words: cfg.min_query_words,
        }
    }
}

/// Short inputs ("hi", "thanks!") are not worth a search.
pub fn is_retrieval_worthy(text: &str, min_query_words: usize) -> bool {
    text.split_whitespace().count() >= min_query_words.max(1)
}

/// Render hits as the body of one SystemNote. `None` when there are none.
pub fn render_context_note(results: &[RetrievedContext]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let mut out = String::from(
        "Relevant context from the knowledge base. Use it if it helps answer the next message.\n",
    );
    for (i, hit) in results.iter().enumerate() {
        let title = if hit.title.is_empty() {
            hit.source.as_str()
        } else {
            hit.title.as_str()
        };
        let _ = write!(
            out,
            "\n[{}] {title} (source: {}, similarity {:.2})\n{}\n",
            i + 1,
            hit.source,
            hit.similarity,
            hit.text.trim()
        );
    }
    Some(out)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_inputs_skip_retrieval() {
        assert!(!is_retrieval_worthy("hi", 3));
        assert!(!is_retrieval_worthy("   ", 0));
        assert!(is_retrieval_worthy("what is our refund policy", 3));
    }

    #[test]
    fn renders_numbered_hits() {
        let note = render_context_note(&[RetrievedContext {
            text: "Refunds within 30 days.".into(),
            source: "policies.md".into(),
            title: String::new(),
            similarity: 0.812,
        }])
        .unwrap_or_default();
        assert!(note.contains("[1] policies.md (source: policies.md, similarity 0.81)"));
        assert!(note.contains("Refunds within 30 days."));
        assert!(render_context_note(&[]).is_none());
    }
}
