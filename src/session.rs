//! Conversation session store
//!
//! Bounded in-memory histories keyed by conversation id. History is
//! replaced wholesale at turn boundaries, so a turn either lands
//! completely or not at all.

use crate::models::ChatMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Most messages kept per conversation; older ones age out
pub const MAX_HISTORY_MESSAGES: usize = 20;

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn history(&self, conversation_id: &str) -> Vec<ChatMessage>;
    async fn replace(&self, conversation_id: &str, messages: Vec<ChatMessage>);
}

/// Process-local store; sessions do not survive a restart
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn replace(&self, conversation_id: &str, mut messages: Vec<ChatMessage>) {
        if messages.len() > MAX_HISTORY_MESSAGES {
            messages.drain(..messages.len() - MAX_HISTORY_MESSAGES);
        }
        debug!(
            conversation_id,
            kept = messages.len(),
            "session history replaced"
        );
        self.sessions
            .write()
            .await
            .insert(conversation_id.to_string(), messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_conversation_starts_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.history("nope").await.is_empty());
    }

    #[tokio::test]
    async fn replace_keeps_only_the_newest_messages() {
        let store = InMemorySessionStore::new();

        let messages: Vec<ChatMessage> = (0..25)
            .map(|i| ChatMessage::user(format!("message {}", i)))
            .collect();
        store.replace("conv", messages).await;

        let history = store.history("conv").await;
        assert_eq!(history.len(), MAX_HISTORY_MESSAGES);
        // oldest five dropped
        assert_eq!(history[0].content, "message 5");
        assert_eq!(history[19].content, "message 24");
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = InMemorySessionStore::new();

        store.replace("a", vec![ChatMessage::user("from a")]).await;
        store.replace("b", vec![ChatMessage::user("from b")]).await;

        assert_eq!(store.history("a").await[0].content, "from a");
        assert_eq!(store.history("b").await[0].content, "from b");
        assert_eq!(store.session_count().await, 2);
    }
}
