//! Run checkpoint persistence
//!
//! A checkpoint holds everything needed to resume a plan-execute run in a
//! different process: goal, plans, past steps, status and the resume token.
//! Postgres when a database URL is configured, in-memory otherwise.

use crate::error::OrchestrationError;
use crate::models::{Checkpoint, RunStatus};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or overwrite
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Overwrite only if the stored status is still `expected`.
    /// Returns false when another writer got there first.
    async fn save_if_status(&self, expected: RunStatus, checkpoint: &Checkpoint) -> Result<bool>;

    async fn load(&self, run_id: Uuid) -> Result<Option<Checkpoint>>;

    async fn find_by_token(&self, resume_token: Uuid) -> Result<Option<Checkpoint>>;
}

/// In-memory checkpoint store for development and tests
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    runs: Arc<RwLock<HashMap<Uuid, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(checkpoint.run_id, checkpoint.clone());
        Ok(())
    }

    async fn save_if_status(&self, expected: RunStatus, checkpoint: &Checkpoint) -> Result<bool> {
        let mut runs = self.runs.write().await;

        match runs.get(&checkpoint.run_id) {
            Some(stored) if stored.status == expected => {
                runs.insert(checkpoint.run_id, checkpoint.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn find_by_token(&self, resume_token: Uuid) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .find(|checkpoint| checkpoint.resume_token == resume_token)
            .cloned())
    }
}

pub struct PostgresCheckpointStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

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
                    CREATE TABLE IF NOT EXISTS run_checkpoints (
                      run_id UUID PRIMARY KEY,
                      resume_token UUID NOT NULL UNIQUE,
                      session_id UUID NOT NULL,
                      status TEXT NOT NULL,
                      state TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL
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
                    "Failed to initialize checkpoint schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    async fn fetch_one_where(&self, column: &str, id: Uuid) -> Result<Option<Checkpoint>> {
        self.ensure_schema().await?;

        let query = format!("SELECT state FROM run_checkpoints WHERE {} = $1", column);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to load checkpoint: {}", e))
            })?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("state")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO run_checkpoints (run_id, resume_token, session_id, status, state, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id) DO UPDATE
              SET status = EXCLUDED.status,
                  state = EXCLUDED.state,
                  updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(checkpoint.run_id)
        .bind(checkpoint.resume_token)
        .bind(checkpoint.session_id)
        .bind(checkpoint.status.to_string())
        .bind(serde_json::to_string(checkpoint)?)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to save checkpoint: {}", e)))?;

        Ok(())
    }

    async fn save_if_status(&self, expected: RunStatus, checkpoint: &Checkpoint) -> Result<bool> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            r#"
            UPDATE run_checkpoints
               SET status = $3, state = $4, updated_at = $5
             WHERE run_id = $1 AND status = $2
            "#,
        )
        .bind(checkpoint.run_id)
        .bind(expected.to_string())
        .bind(checkpoint.status.to_string())
        .bind(serde_json::to_string(checkpoint)?)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to update checkpoint: {}", e))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<Checkpoint>> {
        self.fetch_one_where("run_id", run_id).await
    }

    async fn find_by_token(&self, resume_token: Uuid) -> Result<Option<Checkpoint>> {
        self.fetch_one_where("resume_token", resume_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Plan;
    use chrono::Utc;

    fn checkpoint() -> Checkpoint {
        let plan = Plan::new(vec!["Check balance".to_string()]);
        let now = Utc::now();
        Checkpoint {
            run_id: Uuid::new_v4(),
            resume_token: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            goal: "What is my balance?".to_string(),
            original_plan: plan.clone(),
            plan,
            past_steps: Vec::new(),
            status: RunStatus::AwaitingApproval,
            approval: None,
            response: None,
            replans_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_run_and_token() {
        let store = InMemoryCheckpointStore::new();
        let saved = checkpoint();
        store.save(&saved).await.unwrap();

        let by_run = store.load(saved.run_id).await.unwrap().unwrap();
        let by_token = store.find_by_token(saved.resume_token).await.unwrap().unwrap();
        assert_eq!(by_run.goal, by_token.goal);
        assert!(store.find_by_token(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_only_one_writer_wins_a_transition() {
        let store = InMemoryCheckpointStore::new();
        let mut saved = checkpoint();
        store.save(&saved).await.unwrap();

        saved.status = RunStatus::Running;
        assert!(store
            .save_if_status(RunStatus::AwaitingApproval, &saved)
            .await
            .unwrap());

        saved.status = RunStatus::Declined;
        assert!(!store
            .save_if_status(RunStatus::AwaitingApproval, &saved)
            .await
            .unwrap());

        let stored = store.load(saved.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
    }

    #[test]
    fn test_checkpoint_survives_serialization() {
        let saved = checkpoint();
        let raw = serde_json::to_string(&saved).unwrap();
        let restored: Checkpoint = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.resume_token, saved.resume_token);
        assert_eq!(restored.status, RunStatus::AwaitingApproval);
    }
}
