//! Step execution
//!
//! Executes the first remaining step of a plan with a tool-using agent and
//! reduces the agent's transcript to a single result string.

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::llm::ChatModel;
use crate::models::{Message, Plan, RequestContext};
use crate::subagents::{Agent, ToolAgent};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const EXECUTOR_NAME: &str = "StepExecutor";

const EXECUTOR_INSTRUCTIONS: &str = "You are a banking assistant executing one step of an \
approved plan. Use the available tools to complete the step and report its outcome \
concisely, including the figures and identifiers later steps will need. Never perform \
actions that belong to other steps.";

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute `plan.steps[0]` and return its result text
    async fn execute(&self, plan: &Plan, ctx: &RequestContext) -> Result<String>;
}

/// Task text handed to the executing agent
pub fn format_task(plan: &Plan) -> Result<String> {
    let task = plan
        .steps
        .first()
        .ok_or_else(|| OrchestrationError::ExecutionError("plan has no steps left".to_string()))?;

    Ok(format!(
        "For the following plan:\n{}\n\nYou are tasked with executing step 1, {}.",
        plan.numbered(),
        task
    ))
}

pub struct AgentStepExecutor {
    agent: Arc<dyn Agent>,
}

impl AgentStepExecutor {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    /// Tool agent over the full registry
    pub fn with_registry(model: Arc<dyn ChatModel>, registry: ToolRegistry, settings: &Settings) -> Self {
        let agent = ToolAgent::new(
            EXECUTOR_NAME,
            "Executes single plan steps with the banking tools",
            EXECUTOR_INSTRUCTIONS,
            model,
            registry,
        )
        .with_max_tool_rounds(settings.agent_max_tool_rounds);

        Self::new(Arc::new(agent))
    }
}

#[async_trait]
impl StepExecutor for AgentStepExecutor {
    async fn execute(&self, plan: &Plan, ctx: &RequestContext) -> Result<String> {
        let task = format_task(plan)?;
        let produced = self.agent.invoke(&[Message::user(task)], ctx).await?;

        debug!(
            agent = %self.agent.name(),
            messages = produced.len(),
            "Step produced messages"
        );

        produced
            .iter()
            .rev()
            .find(|m| m.is_final_answer())
            .map(|m| m.content.clone())
            .ok_or_else(|| {
                OrchestrationError::ExecutionError("executor produced no answer".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelReply, ScriptedModel};
    use crate::tools::Tool;
    use serde_json::{json, Value};

    struct BalanceTool;

    #[async_trait]
    impl Tool for BalanceTool {
        fn name(&self) -> &str {
            "get_account_balance_list"
        }

        fn description(&self) -> &str {
            "balances"
        }

        async fn execute(&self, _args: &Value, _ctx: &RequestContext) -> Result<Value> {
            Ok(json!([{"accountNumber": "NL01", "balance": 120.5}]))
        }
    }

    fn plan() -> Plan {
        Plan::new(vec![
            "Look up the balance of NL01".to_string(),
            "Report it".to_string(),
        ])
    }

    #[test]
    fn test_task_names_first_step_and_full_plan() {
        let task = format_task(&plan()).unwrap();
        assert_eq!(
            task,
            "For the following plan:\n1. Look up the balance of NL01\n2. Report it\n\n\
             You are tasked with executing step 1, Look up the balance of NL01."
        );
        assert!(format_task(&Plan::default()).is_err());
    }

    #[tokio::test]
    async fn test_executes_through_tools() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelReply::call("get_account_balance_list", json!({})),
            ModelReply::text("NL01 holds 120.50 EUR"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BalanceTool));

        let executor =
            AgentStepExecutor::with_registry(model.clone(), registry, &Settings::default());
        let result = executor
            .execute(&plan(), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(result, "NL01 holds 120.50 EUR");
        let second = &model.requests()[1];
        assert!(second.messages.iter().any(|m| m.content.contains("120.5")));
    }
}
