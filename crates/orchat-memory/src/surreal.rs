//! SurrealDB-backed thread store
//!
//! Threads and messages live in two schemaless tables. Nested message parts
//! (reasoning steps, usage) are stored as JSON strings.

use crate::storage::{NewThread, ThreadStore};
use async_trait::async_trait;
use chrono::Utc;
use orchat_common::{
    ChatError, ChatThread, Message, ReasoningStep, Result, Role, ThreadUpdate, TokenUsage,
    current_timestamp_millis, generate_id,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::{
    Surreal,
    engine::local::{Db, Mem, SurrealKv},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// SurrealDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SurrealConfig {
    /// File-based SurrealDB
    File {
        path: PathBuf,
        namespace: String,
        database: String,
    },
    /// Memory-based SurrealDB
    Memory { namespace: String, database: String },
}

impl SurrealConfig {
    fn namespace_and_database(&self) -> (&str, &str) {
        match self {
            SurrealConfig::File {
                namespace,
                database,
                ..
            }
            | SurrealConfig::Memory {
                namespace,
                database,
            } => (namespace, database),
        }
    }
}

impl Default for SurrealConfig {
    fn default() -> Self {
        SurrealConfig::File {
            path: PathBuf::from("./data/threads.db"),
            namespace: "orchat".to_string(),
            database: "chat".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: String,
    role: String,
    content: String,
    reasoning: String,
    usage: String,
    #[serde(default)]
    cost: Option<f64>,
    sent_at: i64,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let reasoning: Vec<ReasoningStep> = serde_json::from_str(&self.reasoning)
            .unwrap_or_else(|e| {
                warn!("Unreadable reasoning on message {}: {}", self.id, e);
                Vec::new()
            });
        let usage: Option<TokenUsage> = serde_json::from_str(&self.usage).unwrap_or_default();

        Ok(Message {
            role: self.role.parse::<Role>()?,
            id: Some(self.id),
            content: self.content,
            reasoning,
            usage,
            cost: self.cost,
            timestamp: self.sent_at,
        })
    }
}

fn storage_error(action: &'static str) -> impl Fn(surrealdb::Error) -> ChatError {
    move |e| ChatError::Storage(format!("Failed to {}: {}", action, e))
}

const THREAD_FIELDS: &str =
    "record::id(id) AS id, title, model_id, total_cost, created_at, updated_at";

/// SurrealDB thread store
#[derive(Clone)]
pub struct SurrealThreadStore {
    db: Surreal<Db>,
    initialized: Arc<RwLock<bool>>,
}

impl SurrealThreadStore {
    /// Create a new SurrealDB thread store
    pub async fn new(config: SurrealConfig) -> Result<Self> {
        let db: Surreal<Db> = match &config {
            SurrealConfig::File { path, .. } => {
                debug!("Initializing SurrealDB in file mode at: {:?}", path);
                Surreal::new::<SurrealKv>(path.clone())
                    .await
                    .map_err(storage_error("open SurrealDB file"))?
            }
            SurrealConfig::Memory { .. } => {
                debug!("Initializing SurrealDB in memory mode");
                Surreal::new::<Mem>(())
                    .await
                    .map_err(storage_error("create SurrealDB connection"))?
            }
        };

        let (namespace, database) = config.namespace_and_database();
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(storage_error("set namespace/database"))?;

        info!("SurrealDB thread store ready ({}/{})", namespace, database);

        Ok(Self {
            db,
            initialized: Arc::new(RwLock::new(false)),
        })
    }

    /// In-memory store with default namespace names
    pub async fn in_memory() -> Result<Self> {
        Self::new(SurrealConfig::Memory {
            namespace: "orchat".to_string(),
            database: "chat".to_string(),
        })
        .await
    }

    /// Initialize the database schema
    pub async fn initialize_schema(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        self.db
            .query(
                "DEFINE TABLE IF NOT EXISTS chat_threads SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS chat_messages SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS thread_messages ON chat_messages FIELDS thread_id, sent_at;",
            )
            .await
            .map_err(storage_error("define tables"))?
            .check()
            .map_err(storage_error("define tables"))?;

        *initialized = true;
        debug!("SurrealDB schema initialized");
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SurrealThreadStore {
    async fn create_thread(&self, thread: NewThread) -> Result<String> {
        self.initialize_schema().await?;

        let id = generate_id();
        let now = current_timestamp_millis();

        self.db
            .query(
                "CREATE type::thing('chat_threads', $id) SET
                    title = $title,
                    model_id = $model_id,
                    total_cost = $total_cost,
                    created_at = $now,
                    updated_at = $now",
            )
            .bind(("id", id.clone()))
            .bind(("title", thread.title))
            .bind(("model_id", thread.model_id))
            .bind(("total_cost", 0.0_f64))
            .bind(("now", now))
            .await
            .map_err(storage_error("create thread"))?
            .check()
            .map_err(storage_error("create thread"))?;

        debug!("Created thread {}", id);
        Ok(id)
    }

    async fn list_threads(&self) -> Result<Vec<ChatThread>> {
        self.initialize_schema().await?;

        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM chat_threads ORDER BY updated_at DESC",
                THREAD_FIELDS
            ))
            .await
            .map_err(storage_error("list threads"))?;

        response.take(0).map_err(storage_error("read threads"))
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        self.initialize_schema().await?;

        let mut response = self
            .db
            .query(format!(
                "SELECT {} FROM type::thing('chat_threads', $id)",
                THREAD_FIELDS
            ))
            .bind(("id", thread_id.to_string()))
            .await
            .map_err(storage_error("get thread"))?;

        let rows: Vec<ChatThread> = response.take(0).map_err(storage_error("read thread"))?;
        Ok(rows.into_iter().next())
    }

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<()> {
        if self.get_thread(thread_id).await?.is_none() {
            return Err(ChatError::Storage(format!("Thread not found: {}", thread_id)));
        }

        let mut assignments = vec!["updated_at = $updated_at"];
        if update.title.is_some() {
            assignments.push("title = $title");
        }
        if update.model_id.is_some() {
            assignments.push("model_id = $model_id");
        }
        if update.total_cost.is_some() {
            assignments.push("total_cost = $total_cost");
        }

        let sql = format!(
            "UPDATE type::thing('chat_threads', $id) SET {}",
            assignments.join(", ")
        );

        let mut query = self
            .db
            .query(sql)
            .bind(("id", thread_id.to_string()))
            .bind(("updated_at", current_timestamp_millis()));
        if let Some(title) = update.title {
            query = query.bind(("title", title));
        }
        if let Some(model_id) = update.model_id {
            query = query.bind(("model_id", model_id));
        }
        if let Some(total_cost) = update.total_cost {
            query = query.bind(("total_cost", total_cost));
        }

        query
            .await
            .map_err(storage_error("update thread"))?
            .check()
            .map_err(storage_error("update thread"))?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.initialize_schema().await?;

        self.db
            .query(
                "DELETE chat_messages WHERE thread_id = $id;
                 DELETE type::thing('chat_threads', $id);",
            )
            .bind(("id", thread_id.to_string()))
            .await
            .map_err(storage_error("delete thread"))?
            .check()
            .map_err(storage_error("delete thread"))?;

        debug!("Deleted thread {}", thread_id);
        Ok(())
    }

    async fn add_message(&self, thread_id: &str, message: &Message) -> Result<String> {
        if self.get_thread(thread_id).await?.is_none() {
            return Err(ChatError::Storage(format!("Thread not found: {}", thread_id)));
        }

        let id = generate_id();
        let reasoning = serde_json::to_string(&message.reasoning)?;
        let usage = serde_json::to_string(&message.usage)?;
        let seq = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        self.db
            .query(
                "CREATE type::thing('chat_messages', $id) SET
                    thread_id = $thread_id,
                    role = $role,
                    content = $content,
                    reasoning = $reasoning,
                    usage = $usage,
                    cost = $cost,
                    sent_at = $sent_at,
                    seq = $seq",
            )
            .bind(("id", id.clone()))
            .bind(("thread_id", thread_id.to_string()))
            .bind(("role", message.role.as_str().to_string()))
            .bind(("content", message.content.clone()))
            .bind(("reasoning", reasoning))
            .bind(("usage", usage))
            .bind(("cost", message.cost))
            .bind(("sent_at", message.timestamp))
            .bind(("seq", seq))
            .await
            .map_err(storage_error("add message"))?
            .check()
            .map_err(storage_error("add message"))?;

        Ok(id)
    }

    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.initialize_schema().await?;

        let mut response = self
            .db
            .query(
                "SELECT record::id(id) AS id, role, content, reasoning, usage, cost, sent_at, seq
                 FROM chat_messages WHERE thread_id = $thread_id
                 ORDER BY sent_at ASC, seq ASC",
            )
            .bind(("thread_id", thread_id.to_string()))
            .await
            .map_err(storage_error("get messages"))?;

        let rows: Vec<MessageRow> = response.take(0).map_err(storage_error("read messages"))?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }
}
