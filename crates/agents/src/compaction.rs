//! History compaction: fold older conversation items into one summary note.
//!
//! Runs after an assistant turn. Once enough user turns have accumulated,
//! everything before a keep-last boundary is rendered as a transcript,
//! summarized by the model, and replaced with
//! `[system prompt, summary note, ...kept items]`. Best-effort: any failure
//! leaves the conversation untouched.

use std::{collections::HashMap, fmt::Write, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    conversation::{ConversationStore, summary_note, summary_text},
    model::{ConversationItem, LlmProvider},
    summary_store::{CompactionCheckpoint, SummaryStore},
};

/// Per-item cap inside the transcript handed to the summarizer.
const MAX_TRANSCRIPT_ITEM_CHARS: usize = 2_000;

/// Compaction settings.
#[derive(Debug, Clone)]
pub struct CompactionOptions {
    /// User turns since the last compaction before a new one is attempted.
    pub threshold: usize,
    /// Items kept verbatim at the end of the conversation.
    pub keep_last: usize,
    pub summary_prompt: String,
    pub temperature: f32,
}

impl From<&agentwire_config::AgentwireConfig> for CompactionOptions {
    fn from(cfg: &agentwire_config::AgentwireConfig) -> Self {
        Self {
            threshold: cfg.compaction.threshold,
            keep_last: cfg.compaction.keep_last,
            summary_prompt: cfg.compaction.summary_prompt.clone(),
            temperature: cfg.model.temperature,
        }
    }
}

impl Default for CompactionOptions {
    fn default() -> Self {
        (&agentwire_config::AgentwireConfig::default()).into()
    }
}

/// Compacts one session's conversation. Owns that session's turn counter.
pub struct HistoryCompactor {
    options: CompactionOptions,
    summaries: Arc<dyn SummaryStore>,
    user_turns_since: usize,
}

impl HistoryCompactor {
    pub fn new(options: CompactionOptions, summaries: Arc<dyn SummaryStore>) -> Self {
        Self {
            options,
            summaries,
            user_turns_since: 0,
        }
    }

    pub fn summaries(&self) -> &Arc<dyn SummaryStore> {
        &self.summaries
    }

    pub fn record_user_turn(&mut self) {
        self.user_turns_since += 1;
    }

    /// User turns counted since the last successful compaction.
    pub fn pending_user_turns(&self) -> usize {
        self.user_turns_since
    }

    /// Compact `store` if the threshold is reached. Returns the saved
    /// checkpoint when a compaction happened; never fails.
    pub async fn maybe_compact(
        &mut self,
        store: &mut ConversationStore,
        provider: &dyn LlmProvider,
    ) -> Option<CompactionCheckpoint> {
        if self.user_turns_since < self.options.threshold.max(1) {
            return None;
        }

        let items = store.items();
        let head = usize::from(store.system_prompt().is_some());
        let boundary = pair_safe_boundary(
            items,
            items.len().saturating_sub(self.options.keep_last),
            head,
        );
        let prefix = &items[head..boundary];

        let Some(transcript) = render_transcript(prefix) else {
            debug!(
                items = items.len(),
                boundary, "nothing before the keep-last boundary, skipping compaction"
            );
            return None;
        };
        let covered_turns = prefix
            .iter()
            .filter(|i| matches!(i, ConversationItem::UserTurn { .. }))
            .count();

        let request = [
            ConversationItem::system(self.options.summary_prompt.clone()),
            ConversationItem::user(transcript),
        ];
        let summary = match provider
            .complete(&request, &[], self.options.temperature)
            .await
        {
            Ok(resp) => match resp.joined_text() {
                Some(text) => text,
                None => {
                    warn!("summarizer returned no text, skipping compaction");
                    return None;
                },
            },
            Err(e) => {
                warn!(error = %e, "summarizer call failed, skipping compaction");
                return None;
            },
        };

        let checkpoint = match self.summaries.save(&summary, covered_turns).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(error = %e, "failed to persist compaction summary");
                CompactionCheckpoint::new(summary.clone(), covered_turns)
            },
        };

        let mut replacement = Vec::with_capacity(2);
        if let Some(system) = store.system_prompt() {
            replacement.push(system.clone());
        }
        replacement.push(summary_note(&summary));
        let before = store.len();
        store.replace_prefix(boundary, replacement);
        self.user_turns_since = 0;

        info!(
            before,
            after = store.len(),
            covered_turns,
            summary_chars = summary.len(),
            "conversation compacted"
        );
        Some(checkpoint)
    }
}

/// Move `boundary` backward until no invocation/result pair straddles it.
/// Never goes below `floor`.
fn pair_safe_boundary(items: &[ConversationItem], boundary: usize, floor: usize) -> usize {
    let mut boundary = boundary.clamp(floor, items.len());
    loop {
        let invoked_at: HashMap<&str, usize> = items[..boundary]
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                ConversationItem::ToolInvocation { call_id, .. } => Some((call_id.as_str(), i)),
                _ => None,
            })
            .collect();
        let earliest_split = items[boundary..]
            .iter()
            .filter_map(|item| match item {
                ConversationItem::ToolResult { call_id, .. } => {
                    invoked_at.get(call_id.as_str()).copied()
                },
                _ => None,
            })
            .min();
        match earliest_split {
            Some(idx) if idx < boundary => boundary = idx.max(floor),
            _ => return boundary,
        }
        if boundary == floor {
            return boundary;
        }
    }
}

/// Flat transcript of `items` for the summarizer. `None` when nothing but
/// system notes is present. Earlier summaries are carried along as context.
fn render_transcript(items: &[ConversationItem]) -> Option<String> {
    let tool_names: HashMap<&str, &str> = items
        .iter()
        .filter_map(|item| match item {
            ConversationItem::ToolInvocation { call_id, name, .. } => {
                Some((call_id.as_str(), name.as_str()))
            },
            _ => None,
        })
        .collect();

    let mut earlier = String::new();
    let mut lines = String::new();
    for item in items {
        match item {
            ConversationItem::SystemNote { .. } => {
                if let Some(summary) = summary_text(item) {
                    let _ = writeln!(earlier, "{}", summary.trim());
                }
            },
            ConversationItem::UserTurn { content } => {
                let _ = writeln!(lines, "User: {}", clip(content));
            },
            ConversationItem::AssistantTurn { content } => {
                let _ = writeln!(lines, "Assistant: {}", clip(content));
            },
            ConversationItem::ToolInvocation {
                name, arguments, ..
            } => {
                let _ = writeln!(lines, "[called tool {name} with {arguments}]");
            },
            ConversationItem::ToolResult { call_id, content } => {
                let name = tool_names.get(call_id.as_str()).copied().unwrap_or("tool");
                let _ = writeln!(lines, "[{name} returned: {}]", clip(content));
            },
        }
    }

    if lines.is_empty() {
        return None;
    }
    if earlier.is_empty() {
        Some(lines)
    } else {
        Some(format!(
            "Summary of what came before:\n{earlier}\nConversation:\n{lines}"
        ))
    }
}

fn clip(text: &str) -> &str {
    let text = text.trim();
    if text.len() <= MAX_TRANSCRIPT_ITEM_CHARS {
        return text;
    }
    let mut end = MAX_TRANSCRIPT_ITEM_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
