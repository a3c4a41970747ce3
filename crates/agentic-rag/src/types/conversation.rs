//! Conversation and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::Metadata;
use crate::error::Error;
use crate::util::estimate_tokens;

/// Title given to lazily created conversations
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Conversation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(Error::invalid(format!("Unknown conversation status: {}", other))),
        }
    }
}

/// A chat session. Messages reference it by `conversation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identity, doubles as the session token
    pub id: Uuid,
    /// Owning user, absent for anonymous sessions
    pub user_id: Option<String>,
    /// Display title
    pub title: String,
    /// Lifecycle status
    pub status: ConversationStatus,
    /// Free-form metadata
    pub metadata: Metadata,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update (bumped by every appended message)
    pub updated_at: DateTime<Utc>,
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(Error::invalid(format!("Unknown message role: {}", other))),
        }
    }
}

/// An immutable, persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: Uuid,
    /// Owning conversation
    pub conversation_id: Uuid,
    /// Author role
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Approximate token count
    pub token_count: u32,
    /// Persist time. Strictly increasing within a conversation.
    pub timestamp: DateTime<Utc>,
    /// Insertion order within the conversation, starting at 1
    pub sequence: u64,
    /// Free-form metadata
    pub metadata: Metadata,
}

/// A message about to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub token_count: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMessage {
    /// Build a message, estimating its token count from the content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&[&content]);
        Self {
            role,
            content,
            token_count,
            metadata: Metadata::new(),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_estimates_tokens() {
        let msg = NewMessage::new(MessageRole::User, "one two three four five six seven eight nine ten");
        assert_eq!(msg.token_count, 13);
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::System,
            MessageRole::Tool,
        ] {
            assert_eq!(role.as_str().parse::<MessageRole>().unwrap(), role);
        }
        assert!("moderator".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
