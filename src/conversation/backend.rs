//! Storage backends for one session's turn log and payload map.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::common::errors::{AgentError, AgentResult};
use crate::common::ids::SessionId;
use crate::conversation::turn::Turn;

/// Boxed future type for history storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Payload id → serialized table.
pub type PayloadMap = Map<String, Value>;

/// Turn-history file name inside a session directory.
pub const HISTORY_FILE: &str = "history.json";

/// Payload-map file name inside a session directory.
pub const TABLES_FILE: &str = "tables.json";

/// Persistence for one session.
///
/// Loads never fail: unreadable data degrades to empty. Saves replace the
/// whole stored value.
pub trait HistoryBackend: Send + Sync {
    /// Load the turn log.
    fn load_turns(&self) -> StoreFuture<'_, Vec<Turn>>;

    /// Replace the turn log.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn save_turns<'a>(&'a self, turns: &'a [Turn]) -> StoreFuture<'a, AgentResult<()>>;

    /// Load the payload map.
    fn load_payloads(&self) -> StoreFuture<'_, PayloadMap>;

    /// Replace the payload map.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn save_payloads<'a>(&'a self, payloads: &'a PayloadMap) -> StoreFuture<'a, AgentResult<()>>;
}

/// JSON files under `<root>/<session_id>/`.
pub struct FileHistoryBackend {
    dir: PathBuf,
}

impl FileHistoryBackend {
    /// Backend for `session_id` under `root`.
    #[must_use]
    pub fn new(root: &Path, session_id: &SessionId) -> Self {
        Self {
            dir: root.join(session_id.as_str()),
        }
    }

    /// Session directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_or_default<T: DeserializeOwned + Default>(&self, file: &str) -> T {
        let path = self.dir.join(file);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found, starting empty", path.display());
                return T::default();
            }
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                return T::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Corrupt {}, treating as empty: {e}", path.display());
            T::default()
        })
    }

    /// Write to a temporary sibling, then rename over `file`; readers see the
    /// old or the new content, never a partial write.
    async fn rewrite<T: Serialize + Sync>(&self, file: &str, value: &T) -> AgentResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(value)?;
        let staging = self
            .dir
            .join(format!(".{file}.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, bytes).await?;
        if let Err(e) = tokio::fs::rename(&staging, self.dir.join(file)).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(AgentError::from(e));
        }
        Ok(())
    }
}

impl HistoryBackend for FileHistoryBackend {
    fn load_turns(&self) -> StoreFuture<'_, Vec<Turn>> {
        Box::pin(async move { self.read_or_default(HISTORY_FILE).await })
    }

    fn save_turns<'a>(&'a self, turns: &'a [Turn]) -> StoreFuture<'a, AgentResult<()>> {
        Box::pin(async move { self.rewrite(HISTORY_FILE, &turns).await })
    }

    fn load_payloads(&self) -> StoreFuture<'_, PayloadMap> {
        Box::pin(async move { self.read_or_default(TABLES_FILE).await })
    }

    fn save_payloads<'a>(&'a self, payloads: &'a PayloadMap) -> StoreFuture<'a, AgentResult<()>> {
        Box::pin(async move { self.rewrite(TABLES_FILE, payloads).await })
    }
}

/// Process-local storage, lost on exit.
#[derive(Default)]
pub struct MemoryHistoryBackend {
    turns: Mutex<Vec<Turn>>,
    payloads: Mutex<PayloadMap>,
}

impl MemoryHistoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryBackend for MemoryHistoryBackend {
    fn load_turns(&self) -> StoreFuture<'_, Vec<Turn>> {
        Box::pin(async move {
            self.turns
                .lock()
                .map(|turns| turns.clone())
                .unwrap_or_default()
        })
    }

    fn save_turns<'a>(&'a self, turns: &'a [Turn]) -> StoreFuture<'a, AgentResult<()>> {
        Box::pin(async move {
            let mut stored = self
                .turns
                .lock()
                .map_err(|_| AgentError::Io(std::io::Error::other("history lock poisoned")))?;
            *stored = turns.to_vec();
            Ok(())
        })
    }

    fn load_payloads(&self) -> StoreFuture<'_, PayloadMap> {
        Box::pin(async move {
            self.payloads
                .lock()
                .map(|payloads| payloads.clone())
                .unwrap_or_default()
        })
    }

    fn save_payloads<'a>(&'a self, payloads: &'a PayloadMap) -> StoreFuture<'a, AgentResult<()>> {
        Box::pin(async move {
            let mut stored = self
                .payloads
                .lock()
                .map_err(|_| AgentError::Io(std::io::Error::other("payload lock poisoned")))?;
            stored.clone_from(payloads);
            Ok(())
        })
    }
}
