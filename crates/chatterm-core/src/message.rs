//! Conversation messages and the append-only message log
//!
//! These types are shared by every front end and don't depend on any
//! specific UI framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    text: String,
    role: Role,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl Message {
    /// User message from raw input: trimmed, `None` when nothing is left.
    pub fn from_input(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self::user(text))
        }
    }

    /// Takes `text` as is. Raw input should go through `from_input`, which
    /// rejects blank text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Role::User, None)
    }

    /// Takes `text` as is; the caller makes sure it isn't blank.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, Role::Assistant, None)
    }

    /// Assistant reply tagged with the model the service reported.
    pub fn assistant_from(text: impl Into<String>, model: Option<String>) -> Self {
        Self::new(text, Role::Assistant, model)
    }

    fn new(text: impl Into<String>, role: Role, model: Option<String>) -> Self {
        Self {
            text: text.into(),
            role,
            timestamp: Utc::now(),
            model,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Ordered, append-only record of the messages exchanged this session.
///
/// There is no way to edit or remove an entry once it has been appended.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Model named by the most recent assistant reply, if any reported one.
    pub fn last_model(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.model.is_some())
            .and_then(Message::model)
    }
}
