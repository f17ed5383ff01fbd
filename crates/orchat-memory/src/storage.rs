//! Storage contract for threads and their messages

use async_trait::async_trait;
use orchat_common::{
    ChatError, ChatThread, Message, Result, ThreadUpdate, current_timestamp_millis, generate_id,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Fields needed to open a new thread
#[derive(Debug, Clone)]
pub struct NewThread {
    pub title: String,
    pub model_id: String,
}

impl NewThread {
    pub fn new(title: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            model_id: model_id.into(),
        }
    }
}

/// A trait defining operations for thread persistence.
///
/// Every write is independent; there are no transactions across calls.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create a thread and return its id
    async fn create_thread(&self, thread: NewThread) -> Result<String>;

    /// All threads, most recently updated first
    async fn list_threads(&self) -> Result<Vec<ChatThread>>;

    async fn get_thread(&self, thread_id: &str) -> Result<Option<ChatThread>>;

    /// Apply the given fields and touch `updated_at`
    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<()>;

    /// Delete a thread together with all of its messages
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Persist a message and return its new id. Any id already on the
    /// message is ignored.
    async fn add_message(&self, thread_id: &str, message: &Message) -> Result<String>;

    /// Messages of a thread in ascending timestamp order; empty for unknown threads
    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>>;
}

#[derive(Default)]
struct MemoryState {
    threads: HashMap<String, ChatThread>,
    messages: HashMap<String, Vec<Message>>,
}

/// Process-local store, used for `--memory` sessions and tests
#[derive(Default)]
pub struct MemoryThreadStore {
    state: RwLock<MemoryState>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn thread_not_found(thread_id: &str) -> ChatError {
    ChatError::Storage(format!("Thread not found: {}", thread_id))
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn create_thread(&self, thread: NewThread) -> Result<String> {
        let id = generate_id();
        let now = current_timestamp_millis();
        let record = ChatThread {
            id: id.clone(),
            title: thread.title,
            model_id: thread.model_id,
            created_at: now,
            updated_at: now,
            total_cost: 0.0,
        };

        let mut state = self.state.write().await;
        state.threads.insert(id.clone(), record);
        state.messages.insert(id.clone(), Vec::new());
        debug!("Created thread {}", id);
        Ok(id)
    }

    async fn list_threads(&self) -> Result<Vec<ChatThread>> {
        let state = self.state.read().await;
        let mut threads: Vec<ChatThread> = state.threads.values().cloned().collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        Ok(self.state.read().await.threads.get(thread_id).cloned())
    }

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| thread_not_found(thread_id))?;

        if let Some(title) = update.title {
            thread.title = title;
        }
        if let Some(model_id) = update.model_id {
            thread.model_id = model_id;
        }
        if let Some(total_cost) = update.total_cost {
            thread.total_cost = total_cost;
        }
        thread.updated_at = current_timestamp_millis();
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.threads.remove(thread_id);
        state.messages.remove(thread_id);
        debug!("Deleted thread {}", thread_id);
        Ok(())
    }

    async fn add_message(&self, thread_id: &str, message: &Message) -> Result<String> {
        let mut state = self.state.write().await;
        if !state.threads.contains_key(thread_id) {
            return Err(thread_not_found(thread_id));
        }

        let id = generate_id();
        let stored = message.clone().with_id(id.clone());
        let messages = state.messages.entry(thread_id.to_string()).or_default();
        // after any equal timestamps, so arrival order breaks ties
        let pos = messages.partition_point(|m| m.timestamp <= stored.timestamp);
        messages.insert(pos, stored);
        Ok(id)
    }

    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_read_messages() {
        let store = MemoryThreadStore::new();
        let thread_id = store.create_thread(NewThread::new("New Chat", "m")).await.unwrap();

        let first = Message::user("Hello");
        let mut second = Message::assistant("Hi!");
        second.timestamp = first.timestamp;

        let id1 = store.add_message(&thread_id, &first).await.unwrap();
        let id2 = store.add_message(&thread_id, &second).await.unwrap();
        assert_ne!(id1, id2);

        let messages = store.get_thread_messages(&thread_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id.as_deref(), Some(id1.as_str()));
        assert_eq!(messages[1].content, "Hi!");
    }

    #[tokio::test]
    async fn test_add_message_to_unknown_thread_fails() {
        let store = MemoryThreadStore::new();
        let err = store.add_message("nope", &Message::user("x")).await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(_)));
    }

    #[tokio::test]
    async fn test_delete_thread_removes_messages() {
        let store = MemoryThreadStore::new();
        let thread_id = store.create_thread(NewThread::new("t", "m")).await.unwrap();
        store.add_message(&thread_id, &Message::user("a")).await.unwrap();

        store.delete_thread(&thread_id).await.unwrap();
        assert!(store.get_thread(&thread_id).await.unwrap().is_none());
        assert!(store.get_thread_messages(&thread_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_thread_and_ordering() {
        let store = MemoryThreadStore::new();
        let older = store.create_thread(NewThread::new("older", "m")).await.unwrap();
        let newer = store.create_thread(NewThread::new("newer", "m")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .update_thread(
                &older,
                ThreadUpdate {
                    title: Some("renamed".into()),
                    total_cost: Some(0.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let threads = store.list_threads().await.unwrap();
        assert_eq!(threads[0].id, older);
        assert_eq!(threads[0].title, "renamed");
        assert_eq!(threads[0].total_cost, 0.5);
        assert_eq!(threads[1].id, newer);

        assert!(store.update_thread("missing", ThreadUpdate::default()).await.is_err());
    }
}
