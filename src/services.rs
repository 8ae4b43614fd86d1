//! Process-wide service graph
//!
//! Built once at startup from [`Settings`]; every component receives the
//! clients it needs through its constructor.

use crate::agent::{Orchestrator, OrchestratorLimits};
use crate::audit::AuditLog;
use crate::classifier::{FallbackRouter, KeywordRouter, RoutingClassifier};
use crate::config::Settings;
use crate::execution::AgentStepExecutor;
use crate::llm::{AzureChatClient, ChatModel};
use crate::memory::{ConversationStore, InMemoryConversationStore, PostgresConversationStore};
use crate::planner::LlmPlanner;
use crate::state::{CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
use crate::subagents::build_roster;
use crate::supervisor::{ChatService, ModelRouter, Supervisor};
use crate::tools::{create_default_registry, BankApiClient};
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub struct Services {
    pub chat: Arc<ChatService>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Services {
    /// Azure model, model-driven routing with keyword fallback, storage picked from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(AzureChatClient::new(&settings.llm)?);
        let router = Arc::new(FallbackRouter::new(
            Arc::new(ModelRouter::new(model.clone())),
            Arc::new(KeywordRouter::banking()),
        ));
        let (checkpoints, conversations) = build_stores(settings)?;
        Self::assemble(settings, model, router, checkpoints, conversations)
    }

    pub fn assemble(
        settings: &Settings,
        model: Arc<dyn ChatModel>,
        classifier: Arc<dyn RoutingClassifier>,
        checkpoints: Arc<dyn CheckpointStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Result<Self> {
        let bank = Arc::new(BankApiClient::from_settings(settings)?);
        let registry = create_default_registry(&bank, settings.pagination_max_pages);

        let roster = build_roster(model.clone(), &registry, settings)?;
        let supervisor = Arc::new(Supervisor::new(roster, classifier));
        let chat = Arc::new(ChatService::new(supervisor, conversations));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(LlmPlanner::new(model.clone())),
            Arc::new(AgentStepExecutor::with_registry(model, registry, settings)),
            checkpoints,
            Arc::new(AuditLog::new()),
            OrchestratorLimits::from_settings(settings),
        ));

        Ok(Self { chat, orchestrator })
    }
}

/// Postgres when a database URL is set, in-memory otherwise
pub fn build_stores(
    settings: &Settings,
) -> Result<(Arc<dyn CheckpointStore>, Arc<dyn ConversationStore>)> {
    match settings.database_url.as_deref() {
        Some(url) => {
            info!("Using Postgres for checkpoints and conversations");
            Ok((
                Arc::new(PostgresCheckpointStore::connect_lazy(url)?),
                Arc::new(PostgresConversationStore::connect_lazy(url)?),
            ))
        }
        None => {
            info!("DATABASE_URL not set, keeping state in memory");
            Ok((
                Arc::new(InMemoryCheckpointStore::new()),
                Arc::new(InMemoryConversationStore::new()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    #[test]
    fn test_in_memory_stores_without_database() {
        let settings = Settings::default();
        assert!(build_stores(&settings).is_ok());
    }

    #[tokio::test]
    async fn test_assemble_with_scripted_model() {
        let settings = Settings {
            bank_base_url: "http://127.0.0.1:1".to_string(),
            ..Settings::default()
        };
        let (checkpoints, conversations) = build_stores(&settings).unwrap();
        let services = Services::assemble(
            &settings,
            Arc::new(ScriptedModel::default()),
            Arc::new(KeywordRouter::banking()),
            checkpoints,
            conversations,
        );
        assert!(services.is_ok());
    }
}
