//! Session resolution and transcript access

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::executor::{run_with_retry, RetryPolicy};
use crate::providers::ConversationStore;
use crate::types::{Conversation, Message, MessageRole, NewMessage};
use crate::validation::parse_uuid;

/// Owns the conversation lifecycle on top of a [`ConversationStore`]
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    policy: RetryPolicy,
}

impl SessionManager {
    /// Store lookups during resolution are retried with `policy`
    pub fn new(store: Arc<dyn ConversationStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Return the conversation named by `session_token`, or create a fresh one.
    ///
    /// A blank, malformed, or unknown token mints a new identity; the token is
    /// never adopted as an ID.
    pub async fn resolve(
        &self,
        session_token: Option<&str>,
        user_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Conversation> {
        let store = self.store.as_ref();

        let parsed = session_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .and_then(|token| Uuid::parse_str(token).ok());

        if let Some(id) = parsed {
            let existing =
                run_with_retry("conversation_lookup", &self.policy, cancel, move || store.get(id))
                    .await?;
            if let Some(conversation) = existing {
                tracing::debug!("Resumed conversation {}", conversation.id);
                return Ok(conversation);
            }
            tracing::info!("Session {} not found, starting a new conversation", id);
        }

        let owner = user_id.map(str::to_string);
        let conversation = run_with_retry("conversation_create", &self.policy, cancel, move || {
            store.create(owner.clone())
        })
        .await?;
        tracing::info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// Persist one message at the end of the transcript. Not retried.
    pub async fn append(
        &self,
        conversation: &Conversation,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let message = self
            .store
            .append_message(conversation.id, NewMessage::new(role, content))
            .await?;
        tracing::debug!(
            "Appended {} message {} to {} ({} tokens)",
            role.as_str(),
            message.id,
            conversation.id,
            message.token_count
        );
        Ok(message)
    }

    /// Ordered transcript for a session token
    pub async fn history(&self, session_token: &str) -> Result<Vec<Message>> {
        let id = parse_uuid(session_token, "session_id")?;
        if self.store.get(id).await?.is_none() {
            return Err(Error::not_found("Conversation", id));
        }
        let messages = self.store.list_messages(id).await?;
        tracing::debug!("Loaded {} messages for {}", messages.len(), id);
        Ok(messages)
    }

    /// Delete a conversation with its messages and trace
    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        let id = parse_uuid(conversation_id, "conversation_id")?;
        if self.store.get(id).await?.is_none() {
            return Err(Error::not_found("Conversation", id));
        }
        let removed = self.store.delete(id).await?;
        tracing::info!("Deleted conversation {} with {} messages", id, removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::ConversationDb;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(ConversationDb::in_memory().unwrap()),
            RetryPolicy::new(2, Duration::from_millis(1)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_resolve_creates_then_resumes() {
        let sessions = manager();
        let cancel = CancellationToken::new();

        let created = sessions.resolve(None, Some("u1"), &cancel).await.unwrap();
        assert_eq!(created.title, "New Conversation");
        assert_eq!(created.user_id.as_deref(), Some("u1"));

        let token = created.id.to_string();
        let resumed = sessions.resolve(Some(&token), None, &cancel).await.unwrap();
        assert_eq!(resumed.id, created.id);
        assert_eq!(resumed.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_resolve_never_adopts_token() {
        let sessions = manager();
        let cancel = CancellationToken::new();

        let unknown = Uuid::new_v4();
        let token = unknown.to_string();
        for input in [Some(token.as_str()), Some("not-a-uuid"), Some("   "), None] {
            let conv = sessions.resolve(input, None, &cancel).await.unwrap();
            assert_ne!(conv.id, unknown);
        }
    }

    #[tokio::test]
    async fn test_append_then_history_round_trip() {
        let sessions = manager();
        let cancel = CancellationToken::new();
        let conv = sessions.resolve(None, None, &cancel).await.unwrap();

        sessions.append(&conv, MessageRole::User, "What is RAG?").await.unwrap();
        sessions.append(&conv, MessageRole::Assistant, "Retrieval first.").await.unwrap();

        let history = sessions.history(&conv.id.to_string()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "What is RAG?");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert!(history[0].timestamp < history[1].timestamp);
    }

    #[tokio::test]
    async fn test_history_errors() {
        let sessions = manager();
        let cancel = CancellationToken::new();

        let err = sessions.history("garbage").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = sessions.history(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let conv = sessions.resolve(None, None, &cancel).await.unwrap();
        assert!(sessions.history(&conv.id.to_string()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let sessions = manager();
        let cancel = CancellationToken::new();
        let conv = sessions.resolve(None, None, &cancel).await.unwrap();
        sessions.append(&conv, MessageRole::User, "hi").await.unwrap();

        let id = conv.id.to_string();
        sessions.delete(&id).await.unwrap();
        assert_eq!(sessions.history(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(sessions.delete(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            sessions.delete("nope").await.unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_appends_both_persist() {
        let sessions = manager();
        let cancel = CancellationToken::new();
        let conv = sessions.resolve(None, None, &cancel).await.unwrap();

        let (a, b) = tokio::join!(
            sessions.append(&conv, MessageRole::User, "a"),
            sessions.append(&conv, MessageRole::User, "b"),
        );
        a.unwrap();
        b.unwrap();

        let history = sessions.history(&conv.id.to_string()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp < history[1].timestamp);
        let mut contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        contents.sort();
        assert_eq!(contents, vec!["a", "b"]);
    }
}
