//! Supervisor router
//!
//! Routes each conversation turn to exactly one sub-agent (or answers it
//! directly) and merges the delegate's messages back into the shared
//! history unchanged.

use crate::classifier::{RouteDecision, RoutingClassifier};
use crate::error::OrchestrationError;
use crate::llm::{ChatModel, CompletionRequest};
use crate::memory::{Conversation, ConversationStore};
use crate::models::{Message, RequestContext, ToolSpec};
use crate::subagents::AgentRoster;
use crate::tools::object_schema;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const SUPERVISOR_NAME: &str = "Supervisor";

const HANDOFF_PREFIX: &str = "transfer_to_";

const ROUTER_INSTRUCTIONS: &str = "You are a friendly general-purpose banking assistant and \
the supervisor of a team of specialised agents. Keep replies to one or two short paragraphs.

Always hand the conversation to the most specific agent for the user's request by calling \
its transfer tool. Only answer yourself for greetings and small talk.

Agents:
";

/// Prompt-driven router: one `transfer_to_<agent>` tool per roster entry,
/// plain text means "answer directly"
pub struct ModelRouter {
    model: Arc<dyn ChatModel>,
}

impl ModelRouter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn handoff_tools(roster: &AgentRoster) -> Vec<ToolSpec> {
        roster
            .agents()
            .iter()
            .map(|agent| ToolSpec {
                name: format!("{}{}", HANDOFF_PREFIX, agent.name()),
                description: format!("Ask {} for help. {}", agent.name(), agent.description()),
                parameters: object_schema(json!({}), &[]),
            })
            .collect()
    }
}

#[async_trait]
impl RoutingClassifier for ModelRouter {
    async fn route(&self, conversation: &[Message], roster: &AgentRoster) -> Result<RouteDecision> {
        let instructions = format!("{}{}", ROUTER_INSTRUCTIONS, roster.capabilities());
        let request = CompletionRequest::new(instructions, conversation.to_vec())
            .with_tools(Self::handoff_tools(roster));

        let reply = self.model.complete(request).await?;

        if let Some(call) = reply.tool_calls.first() {
            let agent = call
                .name
                .strip_prefix(HANDOFF_PREFIX)
                .unwrap_or(&call.name)
                .to_string();
            return Ok(RouteDecision::Delegate { agent });
        }

        match reply.content {
            Some(reply) if !reply.trim().is_empty() => Ok(RouteDecision::Respond { reply }),
            _ => Err(OrchestrationError::RoutingError(
                "router returned neither a handoff nor a reply".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Sub-agent that handled the turn; `None` for a direct reply
    pub agent: Option<String>,
    pub reply: String,
    /// Messages appended to the conversation by this turn
    pub appended: Vec<Message>,
}

pub struct Supervisor {
    roster: AgentRoster,
    classifier: Arc<dyn RoutingClassifier>,
}

impl Supervisor {
    pub fn new(roster: AgentRoster, classifier: Arc<dyn RoutingClassifier>) -> Self {
        Self { roster, classifier }
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    /// Route the latest turn and append the handler's messages verbatim
    pub async fn handle_turn(
        &self,
        conversation: &mut Conversation,
        ctx: &RequestContext,
    ) -> Result<TurnOutcome> {
        let decision = self
            .classifier
            .route(conversation.messages(), &self.roster)
            .await?;

        let agent_name = match decision {
            RouteDecision::Respond { reply } => {
                info!(session_id = %ctx.session_id, "Supervisor answered directly");
                let message = Message::from_agent(SUPERVISOR_NAME, reply.clone());
                conversation.push(message.clone());
                return Ok(TurnOutcome {
                    agent: None,
                    reply,
                    appended: vec![message],
                });
            }
            RouteDecision::Delegate { agent } => agent,
        };

        let agent = match self.roster.get(&agent_name) {
            Some(agent) => agent,
            None => {
                warn!(
                    requested = %agent_name,
                    fallback = %self.roster.default_agent(),
                    "Unknown agent, using default"
                );
                self.roster
                    .get(self.roster.default_agent())
                    .ok_or_else(|| OrchestrationError::AgentNotFound(agent_name.clone()))?
            }
        };

        info!(
            session_id = %ctx.session_id,
            agent = %agent.name(),
            "Delegating turn"
        );

        let produced = agent.invoke(conversation.messages(), ctx).await?;
        conversation.extend(produced.iter().cloned());

        let reply = produced
            .iter()
            .rev()
            .find(|m| m.is_final_answer())
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(TurnOutcome {
            agent: Some(agent.name().to_string()),
            reply,
            appended: produced,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: Uuid,
    pub agent: Option<String>,
    pub reply: String,
    pub appended: Vec<Message>,
}

/// One user message in, one supervisor turn out, history persisted per session
pub struct ChatService {
    supervisor: Arc<Supervisor>,
    store: Arc<dyn ConversationStore>,
}

impl ChatService {
    pub fn new(supervisor: Arc<Supervisor>, store: Arc<dyn ConversationStore>) -> Self {
        Self { supervisor, store }
    }

    pub async fn chat(&self, message: &str, ctx: &RequestContext) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(OrchestrationError::RoutingError(
                "message must not be empty".to_string(),
            ));
        }

        let mut conversation = self.store.load(ctx.session_id).await?;
        let start = conversation.len();
        conversation.push(Message::user(message));

        let outcome = match self.supervisor.handle_turn(&mut conversation, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %ctx.session_id, error = %e, "Chat turn failed");
                let apology = Message::from_agent(
                    SUPERVISOR_NAME,
                    format!("Sorry, I could not complete that request: {}", e),
                );
                conversation.push(apology.clone());
                TurnOutcome {
                    agent: None,
                    reply: apology.content.clone(),
                    appended: vec![apology],
                }
            }
        };

        self.store
            .append(ctx.session_id, conversation.since(start))
            .await?;

        Ok(ChatReply {
            session_id: ctx.session_id,
            agent: outcome.agent,
            reply: outcome.reply,
            appended: outcome.appended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordRouter;
    use crate::llm::{ModelReply, ScriptedModel};
    use crate::memory::InMemoryConversationStore;
    use crate::subagents::Agent;

    /// Answers with a fixed text and remembers how much history it saw
    struct FixedAgent {
        name: &'static str,
        seen: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Agent for FixedAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, messages: &[Message], _ctx: &RequestContext) -> Result<Vec<Message>> {
            self.seen.lock().unwrap().push(messages.len());
            Ok(vec![
                Message::tool_request(
                    self.name,
                    None,
                    vec![crate::models::ToolCall {
                        id: "c1".to_string(),
                        name: "get_account_balance_list".to_string(),
                        arguments: json!({}),
                    }],
                ),
                Message::from_agent(self.name, format!("{} here", self.name)),
            ])
        }
    }

    fn fixed(name: &'static str) -> Arc<FixedAgent> {
        Arc::new(FixedAgent {
            name,
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn roster(agents: &[Arc<FixedAgent>]) -> AgentRoster {
        let agents: Vec<Arc<dyn Agent>> = agents
            .iter()
            .map(|a| a.clone() as Arc<dyn Agent>)
            .collect();
        AgentRoster::new(agents, "KnowledgeAgent").unwrap()
    }

    #[tokio::test]
    async fn test_delegate_messages_are_merged_verbatim() {
        let payments = fixed("PaymentsAgent");
        let knowledge = fixed("KnowledgeAgent");
        let supervisor = Supervisor::new(
            roster(&[payments.clone(), knowledge.clone()]),
            Arc::new(KeywordRouter::banking()),
        );

        let mut conversation = Conversation::new(Uuid::new_v4());
        conversation.push(Message::user("Pay 50 EUR to John"));

        let outcome = supervisor
            .handle_turn(&mut conversation, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.agent.as_deref(), Some("PaymentsAgent"));
        assert_eq!(outcome.reply, "PaymentsAgent here");
        assert_eq!(outcome.appended.len(), 2);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.since(1), outcome.appended.as_slice());
        assert!(knowledge.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agent_falls_back_to_default() {
        let knowledge = fixed("KnowledgeAgent");
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::call(
            "transfer_to_MortgageAgent",
            json!({}),
        )]));
        let supervisor = Supervisor::new(
            roster(&[knowledge.clone()]),
            Arc::new(ModelRouter::new(model)),
        );

        let mut conversation = Conversation::new(Uuid::new_v4());
        conversation.push(Message::user("Mortgage rates?"));

        let outcome = supervisor
            .handle_turn(&mut conversation, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.agent.as_deref(), Some("KnowledgeAgent"));
    }

    #[tokio::test]
    async fn test_model_router_direct_reply_and_handoff_tools() {
        let knowledge = fixed("KnowledgeAgent");
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("Hello! How can I help?")]));
        let supervisor = Supervisor::new(
            roster(&[knowledge.clone()]),
            Arc::new(ModelRouter::new(model.clone())),
        );

        let mut conversation = Conversation::new(Uuid::new_v4());
        conversation.push(Message::user("Hi"));

        let outcome = supervisor
            .handle_turn(&mut conversation, &RequestContext::default())
            .await
            .unwrap();

        assert!(outcome.agent.is_none());
        assert_eq!(outcome.reply, "Hello! How can I help?");
        assert_eq!(conversation.len(), 2);

        let request = &model.requests()[0];
        assert_eq!(request.tools[0].name, "transfer_to_KnowledgeAgent");
        assert!(request.instructions.contains("- KnowledgeAgent: fixed"));
    }

    #[tokio::test]
    async fn test_empty_router_reply_is_an_error() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::default()]));
        let router = ModelRouter::new(model);
        let result = router
            .route(&[Message::user("?")], &roster(&[fixed("KnowledgeAgent")]))
            .await;
        assert!(matches!(result, Err(OrchestrationError::RoutingError(_))));
    }

    #[tokio::test]
    async fn test_chat_service_persists_history_per_session() {
        let transactions = fixed("TransactionsAgent");
        let supervisor = Arc::new(Supervisor::new(
            roster(&[transactions.clone(), fixed("KnowledgeAgent")]),
            Arc::new(KeywordRouter::banking()),
        ));
        let store = Arc::new(InMemoryConversationStore::new());
        let service = ChatService::new(supervisor, store.clone());
        let ctx = RequestContext::new(Uuid::new_v4(), None);

        service.chat("What is my balance?", &ctx).await.unwrap();
        let second = service.chat("And my spending?", &ctx).await.unwrap();

        assert_eq!(second.agent.as_deref(), Some("TransactionsAgent"));
        // Second turn sees the first turn's three messages plus its own question
        assert_eq!(*transactions.seen.lock().unwrap(), vec![1, 4]);
        assert_eq!(store.load(ctx.session_id).await.unwrap().len(), 6);

        assert!(service.chat("   ", &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_turn_is_answered_and_kept_in_history() {
        let supervisor = Arc::new(Supervisor::new(
            roster(&[fixed("KnowledgeAgent")]),
            Arc::new(ModelRouter::new(Arc::new(ScriptedModel::default()))),
        ));
        let store = Arc::new(InMemoryConversationStore::new());
        let service = ChatService::new(supervisor, store.clone());
        let ctx = RequestContext::new(Uuid::new_v4(), None);

        let reply = service.chat("What are your opening hours?", &ctx).await.unwrap();

        assert!(reply.agent.is_none());
        assert!(reply
            .reply
            .starts_with("Sorry, I could not complete that request:"));
        assert_eq!(reply.appended.len(), 1);

        let history = store.load(ctx.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content, "What are your opening hours?");
        assert_eq!(history.messages()[1].content, reply.reply);
    }
}
