//! YAML transcript store.
//!
//! Every conversation lives in one human-readable file:
//!
//! ```yaml
//! conversations:
//!   - uuid: ...
//!     created_at: 2024-01-01 @ 10:00
//!     last_active: 2024-01-01 @ 10:05
//!     turns: [...]
//! ```
//!
//! Each write is a whole-file read-modify-write through a sibling temp file
//! and a rename, so a crash never leaves a half-written transcript. There is
//! no lock; a single writer per file is assumed.

use parley_core::error::{Error, Result};
use parley_core::message::{Conversation, Turn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The on-disk record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFile {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl TranscriptFile {
    pub fn find(&self, uuid: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.uuid == uuid)
    }

    fn find_mut(&mut self, uuid: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.uuid == uuid)
    }
}

/// Reads and writes the transcript file at a fixed path.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    path: PathBuf,
}

impl TranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_error(&self, reason: impl ToString) -> Error {
        Error::Parse {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn io_error(&self, reason: impl ToString) -> Error {
        Error::Io {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Load every conversation. A missing or empty file is an empty set.
    pub fn load(&self) -> Result<TranscriptFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TranscriptFile::default()),
            Err(e) => return Err(self.parse_error(format!("unreadable: {e}"))),
        };

        if content.trim().is_empty() {
            return Ok(TranscriptFile::default());
        }

        // A bare `~` or `null` document counts as empty too
        let file: Option<TranscriptFile> =
            serde_yaml::from_str(&content).map_err(|e| self.parse_error(e))?;
        let file = file.unwrap_or_default();

        debug!(
            path = %self.path.display(),
            count = file.conversations.len(),
            "Transcript loaded"
        );
        Ok(file)
    }

    /// Replace the whole file with `file`.
    pub fn save(&self, file: &TranscriptFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| self.io_error(format!("create directory: {e}")))?;
        }

        let content = serde_yaml::to_string(file)
            .map_err(|e| self.io_error(format!("serialize: {e}")))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "transcript".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, content)
            .map_err(|e| self.io_error(format!("write temp file: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| self.io_error(format!("replace transcript: {e}")))?;

        debug!(
            path = %self.path.display(),
            count = file.conversations.len(),
            "Transcript written"
        );
        Ok(())
    }

    /// Append a turn to the conversation with `conversation_id`.
    ///
    /// An unknown id gets a new record holding only this turn, dated by the
    /// turn's own timestamps.
    pub fn append_turn(&self, conversation_id: &str, turn: &Turn) -> Result<()> {
        let mut file = self.load()?;

        match file.find_mut(conversation_id) {
            Some(conversation) => conversation.push_turn(turn.clone()),
            None => {
                warn!(
                    conversation = conversation_id,
                    path = %self.path.display(),
                    "Conversation not in transcript, creating a record for it"
                );
                let mut conversation = Conversation {
                    uuid: conversation_id.to_string(),
                    created_at: turn.request.timestamp.clone(),
                    last_active: turn.request.timestamp.clone(),
                    host: String::new(),
                    host_is_bot: false,
                    guest: String::new(),
                    guest_is_bot: false,
                    turns: Vec::new(),
                };
                conversation.push_turn(turn.clone());
                file.conversations.push(conversation);
            }
        }

        self.save(&file)
    }

    /// Insert or replace a whole conversation record.
    pub fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut file = self.load()?;
        match file.find_mut(&conversation.uuid) {
            Some(existing) => *existing = conversation.clone(),
            None => file.conversations.push(conversation.clone()),
        }
        self.save(&file)
    }

    /// Insert `conversation` only if its uuid is not stored yet, and return
    /// the stored record. An existing record and its turns are left untouched.
    pub fn ensure_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let mut file = self.load()?;
        if let Some(existing) = file.find(&conversation.uuid) {
            return Ok(existing.clone());
        }

        file.conversations.push(conversation.clone());
        self.save(&file)?;
        Ok(conversation.clone())
    }

    pub fn get_conversation(&self, uuid: &str) -> Result<Option<Conversation>> {
        Ok(self.load()?.find(uuid).cloned())
    }
}
