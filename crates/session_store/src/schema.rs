use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Chat";
pub const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SessionMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// One persisted conversation.
///
/// `title` is fixed by the first user message and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: SessionMessage) {
        let first_user = message.role == Role::User
            && !self.messages.iter().any(|existing| existing.role == Role::User);
        if first_user {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(SessionMessage::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(SessionMessage::new(Role::Assistant, content));
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&SessionMessage> {
        self.messages.last()
    }
}

/// First line of `text`, trimmed, cut to [`TITLE_MAX_CHARS`] characters plus `...`.
#[must_use]
pub fn derive_title(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or_default().trim();
    if first_line.is_empty() {
        return DEFAULT_TITLE.to_owned();
    }
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_owned();
    }
    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}
