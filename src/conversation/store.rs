//! Append-only conversation logs on the local filesystem
//!
//! Layout under the base directory:
//!
//! ```text
//! {base_dir}/{user_id}/{conversation_id}/messages.jsonl
//! {base_dir}/{user_id}/{conversation_id}/raw_api_responses.jsonl
//! {base_dir}/{user_id}/{conversation_id}/audio/
//! ```
//!
//! Every log is read in full on access. There is no locking, compaction or
//! indexing.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ConversationSummary, Message, StoredMessage};

const MESSAGES_FILE: &str = "messages.jsonl";
const RAW_RESPONSES_FILE: &str = "raw_api_responses.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No conversation ids left for user {0:?}")]
    IdsExhausted(String),

    #[error("Corrupt conversation log {}: line {line}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

/// File-backed store of per-user, per-conversation message logs
#[derive(Debug, Clone)]
pub struct ConversationStore {
    base_dir: PathBuf,
}

impl ConversationStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding one conversation (not created)
    pub fn convo_dir(&self, user_id: &str, convo_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.user_dir(user_id)?.join(validate_id(convo_id)?))
    }

    /// Create the conversation directory if needed and return it
    pub async fn ensure_convo_dir(
        &self,
        user_id: &str,
        convo_id: &str,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.convo_dir(user_id, convo_id)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Append a message, creating the conversation on first write
    pub async fn add_message(
        &self,
        user_id: &str,
        convo_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let dir = self.ensure_convo_dir(user_id, convo_id).await?;
        let record = StoredMessage {
            created_at: Utc::now(),
            message: message.clone(),
        };
        append_line(&dir.join(MESSAGES_FILE), &record).await?;

        tracing::debug!(
            user_id,
            convo_id,
            role = %message.role,
            "appended message"
        );
        Ok(())
    }

    /// Load every message of a conversation in write order
    pub async fn load_messages(
        &self,
        user_id: &str,
        convo_id: &str,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .load_records(user_id, convo_id)
            .await?
            .into_iter()
            .map(Message::from)
            .collect())
    }

    /// Load every stored record (message plus timestamp) of a conversation
    pub async fn load_records(
        &self,
        user_id: &str,
        convo_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let path = self.convo_dir(user_id, convo_id)?.join(MESSAGES_FILE);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }

    /// Keep the provider's raw output next to the conversation
    pub async fn append_raw_response(
        &self,
        user_id: &str,
        convo_id: &str,
        response: &Value,
    ) -> Result<(), StoreError> {
        let dir = self.ensure_convo_dir(user_id, convo_id).await?;
        append_line(&dir.join(RAW_RESPONSES_FILE), response).await
    }

    /// Summaries of a user's conversations, most recently updated first
    pub async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut summaries = Vec::new();
        for convo_id in self.convo_ids(user_id).await? {
            let records = self.load_records(user_id, &convo_id).await?;
            summaries.push(ConversationSummary::from_records(convo_id, &records));
        }

        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(summaries)
    }

    /// Next free numeric conversation id, zero-padded to three digits
    ///
    /// Ids with no representable successor are skipped.
    pub async fn get_next_convo_id(&self, user_id: &str) -> Result<String, StoreError> {
        let taken: Vec<u64> = self
            .convo_ids(user_id)
            .await?
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .collect();

        let next = taken
            .iter()
            .filter_map(|n| n.checked_add(1))
            .max()
            .unwrap_or(1);

        // Only possible when both u64::MAX - 1 and u64::MAX are in use
        if taken.contains(&next) {
            return Err(StoreError::IdsExhausted(user_id.to_string()));
        }
        Ok(format!("{:03}", next))
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.base_dir.join(validate_id(user_id)?))
    }

    async fn convo_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let user_dir = self.user_dir(user_id)?;
        let mut entries = match fs::read_dir(&user_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_id(name).is_ok() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }
}

/// Ids become path components, so only plain names are accepted
fn validate_id(id: &str) -> Result<&str, StoreError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(id)
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
