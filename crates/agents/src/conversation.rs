use std::collections::HashSet;

use agentwire_config::SUMMARY_NOTE_PREFIX;

use crate::model::ConversationItem;

/// Ordered log of one session's conversation.
///
/// Append-only, except for [`ConversationStore::replace_prefix`] which the
/// history compactor uses to swap older items for a summary.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    items: Vec<ConversationItem>,
}

impl ConversationStore {
    /// Start a conversation with the system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            items: vec![ConversationItem::system(system_prompt)],
        }
    }

    /// Start a conversation with the system prompt and, if present, a
    /// summary restored from an earlier session.
    pub fn with_restored_summary(system_prompt: impl Into<String>, summary: Option<&str>) -> Self {
        let mut store = Self::new(system_prompt);
        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            store.push(summary_note(summary));
        }
        store
    }

    pub fn push(&mut self, item: ConversationItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationItem> {
        self.items.last()
    }

    /// The leading system prompt, if the conversation starts with one.
    pub fn system_prompt(&self) -> Option<&ConversationItem> {
        self.items
            .first()
            .filter(|item| matches!(item, ConversationItem::SystemNote { .. }))
    }

    /// Replace `items[..boundary]` with `replacement`.
    pub fn replace_prefix(&mut self, boundary: usize, replacement: Vec<ConversationItem>) {
        let tail = self.items.split_off(boundary.min(self.items.len()));
        self.items = replacement;
        self.items.extend(tail);
    }

    /// True when every invocation is followed by exactly one result with its
    /// id before the next user turn, and no result is orphaned.
    pub fn is_balanced(&self) -> bool {
        let mut open: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for item in &self.items {
            match item {
                ConversationItem::ToolInvocation { call_id, .. } => open.push(call_id.as_str()),
                ConversationItem::ToolResult { call_id, .. } => {
                    let Some(pos) = open.iter().position(|id| *id == call_id.as_str()) else {
                        return false;
                    };
                    open.remove(pos);
                    if !seen.insert(call_id.as_str()) {
                        return false;
                    }
                },
                ConversationItem::UserTurn { .. } if !open.is_empty() => return false,
                _ => {},
            }
        }
        open.is_empty()
    }
}

/// The SystemNote that carries a compaction summary.
pub fn summary_note(summary: &str) -> ConversationItem {
    ConversationItem::system(format!("{SUMMARY_NOTE_PREFIX}{}", summary.trim()))
}

/// Summary text of a summary SystemNote.
pub fn summary_text(item: &ConversationItem) -> Option<&str> {
    match item {
        ConversationItem::SystemNote { content } => content.strip_prefix(SUMMARY_NOTE_PREFIX),
        _ => None,
    }
}
