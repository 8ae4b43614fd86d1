//! Conversation persistence
//!
//! Postgres when a database URL is configured, in-memory otherwise.
//! Messages are stored as JSON text keyed by (session, sequence number) and
//! only ever inserted.

use crate::error::OrchestrationError;
use crate::memory::Conversation;
use crate::models::Message;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Full history of a session; empty for unknown sessions
    async fn load(&self, session_id: Uuid) -> Result<Conversation>;

    async fn append(&self, session_id: Uuid, messages: &[Message]) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: Arc<RwLock<HashMap<Uuid, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, session_id: Uuid) -> Result<Conversation> {
        let sessions = self.sessions.read().await;
        let messages = sessions.get(&session_id).cloned().unwrap_or_default();
        Ok(Conversation::from_messages(session_id, messages))
    }

    async fn append(&self, session_id: Uuid, messages: &[Message]) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}

pub struct PostgresConversationStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Lazily connecting pool; nothing is dialled until the first query
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversation_messages (
                      session_id UUID NOT NULL,
                      seq BIGINT NOT NULL,
                      role TEXT NOT NULL,
                      message TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (session_id, seq)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize conversation schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn load(&self, session_id: Uuid) -> Result<Conversation> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT message FROM conversation_messages WHERE session_id = $1 ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to load conversation: {}", e))
        })?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("message")?;
            messages.push(serde_json::from_str::<Message>(&raw)?);
        }

        Ok(Conversation::from_messages(session_id, messages))
    }

    async fn append(&self, session_id: Uuid, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            OrchestrationError::DatabaseError(format!(
                "Failed to begin conversation transaction: {}",
                e
            ))
        })?;

        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) AS last FROM conversation_messages WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("last")?;

        for (offset, message) in messages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO conversation_messages (session_id, seq, role, message)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(session_id)
            .bind(next + 1 + offset as i64)
            .bind(message.role.to_string())
            .bind(serde_json::to_string(message)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to insert conversation message: {}",
                    e
                ))
            })?;
        }

        tx.commit().await.map_err(|e| {
            OrchestrationError::DatabaseError(format!(
                "Failed to commit conversation transaction: {}",
                e
            ))
        })?;

        Ok(())
    }
}
