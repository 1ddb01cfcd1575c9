//! Persistence for compaction summaries.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tokio::{io::AsyncWriteExt, sync::Mutex},
    tracing::{debug, warn},
};

/// One saved compaction summary. Only the latest matters to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionCheckpoint {
    pub summary_text: String,
    /// User turns folded into this summary.
    pub covered_turn_count: usize,
    pub created_at: DateTime<Utc>,
}

impl CompactionCheckpoint {
    pub fn new(summary_text: impl Into<String>, covered_turn_count: usize) -> Self {
        Self {
            summary_text: summary_text.into(),
            covered_turn_count,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn save(&self, summary: &str, covered_turn_count: usize) -> Result<CompactionCheckpoint>;
    async fn load_latest(&self) -> Result<Option<CompactionCheckpoint>>;
}

/// Keeps checkpoints for the lifetime of the process.
#[derive(Default)]
pub struct InMemorySummaryStore {
    checkpoints: Mutex<Vec<CompactionCheckpoint>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.lock().await.len()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn save(&self, summary: &str, covered_turn_count: usize) -> Result<CompactionCheckpoint> {
        let checkpoint = CompactionCheckpoint::new(summary, covered_turn_count);
        self.checkpoints.lock().await.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn load_latest(&self) -> Result<Option<CompactionCheckpoint>> {
        Ok(self.checkpoints.lock().await.last().cloned())
    }
}

/// Append-only JSONL file, one checkpoint per line.
pub struct JsonlSummaryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SummaryStore for JsonlSummaryStore {
    async fn save(&self, summary: &str, covered_turn_count: usize) -> Result<CompactionCheckpoint> {
        let checkpoint = CompactionCheckpoint::new(summary, covered_turn_count);
        let mut line = serde_json::to_string(&checkpoint)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), covered_turn_count, "saved compaction summary");
        Ok(checkpoint)
    }

    async fn load_latest(&self) -> Result<Option<CompactionCheckpoint>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            },
        };
        for line in raw.lines().rev().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<CompactionCheckpoint>(line) {
                Ok(checkpoint) => return Ok(Some(checkpoint)),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping malformed summary line");
                },
            }
        }
        Ok(None)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_returns_latest() {
        let store = InMemorySummaryStore::new();
        assert!(store.load_latest().await.unwrap().is_none());
        store.save("first", 2).await.unwrap();
        store.save("second", 5).await.unwrap();
        let latest = store.load_latest().await.unwrap().unwrap();
        assert_eq!(latest.summary_text, "second");
        assert_eq!(latest.covered_turn_count, 5);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn jsonl_appends_and_reads_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSummaryStore::new(dir.path().join("nested/summaries.jsonl"));
        assert!(store.load_latest().await.unwrap().is_none());

        store.save("user asked about tea", 3).await.unwrap();
        store.save("user switched to coffee", 6).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let latest = store.load_latest().await.unwrap().unwrap();
        assert_eq!(latest.summary_text, "user switched to coffee");
        assert_eq!(latest.covered_turn_count, 6);
    }

    #[tokio::test]
    async fn jsonl_skips_a_torn_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");
        let store = JsonlSummaryStore::new(&path);
        store.save("complete", 1).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"summary_text\": \"trunc");
        std::fs::write(&path, raw).unwrap();

        let latest = store.load_latest().await.unwrap().unwrap();
        assert_eq!(latest.summary_text, "complete");
    }
}
