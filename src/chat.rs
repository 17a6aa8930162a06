use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Title given to a chat until the user or caller renames it.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Opaque unique identifier for a chat, assigned at creation.
///
/// Backed by a random v4 UUID, so uniqueness holds even under repeated
/// rapid creation without any persisted counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Allocate a fresh id.
    pub fn new() -> Self {
        ChatId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        ChatId(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        ChatId(s.to_string())
    }
}

/// Sender of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message in a conversation.
///
/// `content` is required on disk; an empty string is fine, a missing field
/// is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// In-memory representation of one conversation.
///
/// `id` is immutable after creation; `messages` preserves insertion order
/// and is only ever appended to during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub title: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

impl ChatRecord {
    /// Build an empty record with the placeholder title.
    pub fn new(id: ChatId, system_prompt: impl Into<String>) -> Self {
        Self {
            id,
            title: DEFAULT_CHAT_TITLE.to_string(),
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    /// Append a message to the transcript.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Index entry describing this record.
    pub fn index_entry(&self) -> ChatIndexEntry {
        ChatIndexEntry {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// Lightweight summary of a chat, the unit of the chat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatIndexEntry {
    pub id: ChatId,
    pub title: String,
}
