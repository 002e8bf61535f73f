//! Conversation history persistence
//!
//! The whole history is one JSON array, rewritten after every reply, on reset and on exit.

use shared::agent_api::ChatMessage;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the per-user data directory, or `./history.json` when no
    /// home directory can be resolved.
    pub fn open_default() -> Self {
        let path = shared::settings::project_dirs()
            .map(|p| p.data_dir().join("history.json"))
            .unwrap_or_else(|| PathBuf::from("./history.json"));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File contents, or `None` when nothing has been saved yet.
    fn read_raw(&self) -> std::io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Missing, unreadable or corrupt files yield an empty history. Only a
    /// missing file is silent.
    pub fn load(&self) -> Vec<ChatMessage> {
        let content = match self.read_raw() {
            Ok(Some(c)) => c,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("could not read history {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<ChatMessage>>(&content) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("discarding unreadable history {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, history: &[ChatMessage]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(history)?;
        fs::write(&self.path, json)?;
        tracing::debug!("saved {} messages to {}", history.len(), self.path.display());
        Ok(())
    }
}
