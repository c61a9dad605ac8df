//! Conversation types and file-backed persistence

mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{ConversationStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Audio rendering of this message (text-to-speech replies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            audio_file: None,
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

    pub fn with_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_file = Some(path.into());
        self
    }
}

/// A message as written to a conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub message: Message,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        stored.message
    }
}

/// Sidebar entry for a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

const TITLE_MAX_CHARS: usize = 60;

impl ConversationSummary {
    pub fn from_records(id: impl Into<String>, records: &[StoredMessage]) -> Self {
        let title = records
            .iter()
            .find(|r| r.message.role == Role::User)
            .map(|r| title_from(&r.message.content))
            .unwrap_or_else(|| "New chat".to_string());

        Self {
            id: id.into(),
            title,
            message_count: records.len(),
            updated_at: records.last().map(|r| r.created_at),
        }
    }
}

fn title_from(content: &str) -> String {
    let line = content.trim();
    if line.chars().count() <= TITLE_MAX_CHARS {
        return line.to_string();
    }
    let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
    title.push('…');
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);

        let with_audio = Message::assistant("").with_audio("audio/speech_1.mp3");
        let value = serde_json::to_value(&with_audio).unwrap();
        assert_eq!(value["audio_file"], "audio/speech_1.mp3");
    }

    #[test]
    fn test_stored_message_is_flat() {
        let stored = StoredMessage {
            created_at: Utc::now(),
            message: Message::user("Hello"),
        };
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Hello");
        assert!(value.get("created_at").is_some());
    }

    #[test]
    fn test_summary_title() {
        let now = Utc::now();
        let records = vec![
            StoredMessage {
                created_at: now,
                message: Message::system("be nice"),
            },
            StoredMessage {
                created_at: now,
                message: Message::user("x".repeat(80)),
            },
        ];
        let summary = ConversationSummary::from_records("001", &records);
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(summary.title.ends_with('…'));

        let empty = ConversationSummary::from_records("002", &[]);
        assert_eq!(empty.title, "New chat");
        assert!(empty.updated_at.is_none());
    }
}
