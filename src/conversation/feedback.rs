//! Per-session feedback log (`<sessions_dir>/<session_id>/feedback.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::common::errors::AgentResult;
use crate::common::ids::SessionId;

/// Feedback file name inside a session directory.
pub const FEEDBACK_FILE: &str = "feedback.json";

/// One submitted feedback event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// Session the rated message belongs to.
    pub session_id: SessionId,
    /// Caller-chosen key identifying the rated message.
    pub feedback_key: String,
    /// The rated assistant message; tables are stored as their text layout.
    pub ai_message: String,
    /// Rating payload as submitted, e.g. `{"score": "👍", "text": "..."}`.
    pub user_feedback: Value,
}

/// Appends feedback events to per-session JSON files.
#[derive(Clone, Debug)]
pub struct FeedbackLog {
    sessions_dir: PathBuf,
}

impl FeedbackLog {
    /// Log rooted at `sessions_dir`.
    #[must_use]
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    fn path(&self, session_id: &SessionId) -> PathBuf {
        self.sessions_dir.join(session_id.as_str()).join(FEEDBACK_FILE)
    }

    /// Append `entry` to its session's feedback file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn submit(&self, entry: FeedbackEntry) -> AgentResult<()> {
        let path = self.path(&entry.session_id);
        let mut entries = read_entries(&path).await;
        entries.push(entry);

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(&entries)?).await?;
        info!("Feedback stored in {}", path.display());
        Ok(())
    }

    /// Feedback recorded for `session_id`, oldest first.
    pub async fn entries(&self, session_id: &SessionId) -> Vec<FeedbackEntry> {
        read_entries(&self.path(session_id)).await
    }
}

async fn read_entries(path: &Path) -> Vec<FeedbackEntry> {
    let Ok(raw) = tokio::fs::read_to_string(path).await else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Corrupt feedback file {}, starting over: {e}", path.display());
        Vec::new()
    })
}
