//! JSONL-backed session persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use lumen_ask::{Error, MessageRole, Result, SessionStore};

/// Session entry types for the JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionEntry {
    /// Session metadata
    Metadata {
        id: String,
        kind: String,
        created_at: i64,
    },
    /// A persisted message
    Message {
        role: String,
        text: String,
        timestamp: i64,
    },
}

/// Session store persisting one JSONL file per session, with an active-
/// session marker per kind so consecutive asks share a session.
pub struct JsonlSessionStore {
    root: PathBuf,
}

impl JsonlSessionStore {
    /// Get the default sessions directory
    pub fn sessions_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen")
            .join("sessions")
    }

    /// Create a store rooted at the default sessions directory
    pub fn new() -> Self {
        Self::with_root(Self::sessions_dir())
    }

    /// Create a store rooted at a specific directory
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", id))
    }

    fn marker_path(&self, kind: &str) -> PathBuf {
        self.root.join(format!("active-{}", kind))
    }

    fn create_session(&self, kind: &str) -> std::io::Result<String> {
        fs::create_dir_all(&self.root)?;
        let id = uuid::Uuid::new_v4().to_string();

        let mut file = File::create(self.session_path(&id))?;
        let metadata = SessionEntry::Metadata {
            id: id.clone(),
            kind: kind.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        writeln!(file, "{}", serde_json::to_string(&metadata)?)?;

        fs::write(self.marker_path(kind), &id)?;
        Ok(id)
    }
}

impl Default for JsonlSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn create_or_reuse_active(&self, kind: &str) -> Result<String> {
        // Reuse the marked session if its file still exists.
        if let Ok(id) = fs::read_to_string(self.marker_path(kind)) {
            let id = id.trim().to_string();
            if !id.is_empty() && self.session_path(&id).exists() {
                return Ok(id);
            }
        }

        self.create_session(kind)
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn append_message(&self, session_id: &str, role: MessageRole, text: &str) -> Result<()> {
        let entry = SessionEntry::Message {
            role: role.as_str().to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let line =
            serde_json::to_string(&entry).map_err(|e| Error::Persistence(e.to_string()))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.session_path(session_id))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}
