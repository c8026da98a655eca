//! Message, Turn and Conversation domain types.
//!
//! These are the value records of a transcript:
//! a request Message and a response Message form a Turn, and a Conversation
//! is the ordered sequence of Turns between a host and a guest.

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Minute-precision timestamp format used throughout transcripts.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d @ %H:%M";

/// Current local time rendered with [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Which side of an exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The party asking
    #[serde(alias = "user")]
    Request,
    /// The party answering
    #[serde(alias = "assistant")]
    Response,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Request => write!(f, "request"),
            Role::Response => write!(f, "response"),
        }
    }
}

/// A single message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub uuid: String,

    /// Request or response
    pub role: Role,

    /// Display name of whoever produced the message
    pub speaker: String,

    /// The text content
    pub content: String,

    /// Minute-precision creation time (`YYYY-MM-DD @ HH:MM`)
    pub timestamp: String,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(role: Role, speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            role,
            speaker: speaker.into(),
            content: content.into(),
            timestamp: timestamp_now(),
        }
    }

    /// Create a new request message.
    pub fn request(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Request, speaker, content)
    }

    /// Create a new response message.
    pub fn response(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Response, speaker, content)
    }

    /// Replace the timestamp (used when rebuilding messages from storage).
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Render for a model prompt, wrapped in chat-template delimiters.
    pub fn to_prompt_string(&self) -> String {
        format!(
            "<|im_start|>{} (Timestamp: {}): \n{}<|im_end|>",
            self.speaker, self.timestamp, self.content
        )
    }

    /// Render in memory form: `speaker @ timestamp: content`.
    ///
    /// This is the document text stored in the vector index and the form
    /// parsed back by result formatting.
    pub fn to_memory_string(&self) -> String {
        format!("{} @ {}: {}", self.speaker, self.timestamp, self.content)
    }
}

/// One request/response exchange. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub uuid: String,
    pub request: Message,
    pub response: Message,
}

impl Turn {
    /// Pair a request with its response under a fresh turn id.
    pub fn new(request: Message, response: Message) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            request,
            response,
        }
    }

    /// Request then response.
    pub fn messages(&self) -> [&Message; 2] {
        [&self.request, &self.response]
    }
}

/// An ordered sequence of turns between a host and a guest.
///
/// `last_active` always equals the response timestamp of the newest turn,
/// or `created_at` while the conversation is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub uuid: String,
    pub created_at: String,
    pub last_active: String,

    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub host_is_bot: bool,
    #[serde(default)]
    pub guest: String,
    #[serde(default)]
    pub guest_is_bot: bool,

    #[serde(default)]
    pub turns: Vec<Turn>,
}

/// Start a new conversation with a fresh id and the current time.
pub fn start_conversation(
    host: impl Into<String>,
    host_is_bot: bool,
    guest: impl Into<String>,
    guest_is_bot: bool,
) -> Conversation {
    let now = timestamp_now();
    let conversation = Conversation {
        uuid: Uuid::new_v4().to_string(),
        created_at: now.clone(),
        last_active: now,
        host: host.into(),
        host_is_bot,
        guest: guest.into(),
        guest_is_bot,
        turns: Vec::new(),
    };

    info!(conversation = %conversation.uuid, host = %conversation.host, guest = %conversation.guest, "New conversation started");
    conversation
}

impl Conversation {
    /// Build a turn for this conversation. Does not append it.
    pub fn create_turn(&self, request: Message, response: Message) -> Turn {
        Turn::new(request, response)
    }

    /// Append a turn and advance `last_active` to its response timestamp.
    pub fn push_turn(&mut self, turn: Turn) {
        self.last_active = turn.response.timestamp.clone();
        self.turns.push(turn);
    }

    /// The most recent turn, if any.
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
