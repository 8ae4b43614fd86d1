//! Model-backed planner
//!
//! Both calls ask for a single JSON object. Output that does not parse is
//! an error; the orchestrator treats it as fatal for the run.

use crate::error::OrchestrationError;
use crate::llm::{ChatModel, CompletionRequest};
use crate::models::{Message, PastStep, Plan, ReplanAction};
use crate::planner::Planner;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const PLANNING_RULES: &str = "For the given objective, come up with a simple step by step plan. \
This plan should involve individual tasks that, if executed correctly, will yield the correct \
answer. Do not add any superfluous steps. The result of the final step should be the final \
answer. Make sure that each step has all the information needed - do not skip steps.";

pub struct LlmPlanner {
    model: Arc<dyn ChatModel>,
}

#[derive(Debug, Deserialize)]
struct PlanWire {
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionWire {
    Respond { response: String },
    Plan { steps: Vec<String> },
}

#[derive(Debug, Deserialize)]
struct ActWire {
    action: ActionWire,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn planning_instructions() -> String {
        format!(
            "{}\n\nReply with JSON only, in the form {{\"steps\": [\"...\", \"...\"]}}.",
            PLANNING_RULES
        )
    }

    fn replanning_prompt(goal: &str, original_plan: &Plan, past_steps: &[PastStep]) -> String {
        let done = past_steps
            .iter()
            .map(|past| format!("Step: {}\nResult: {}", past.step, past.result))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{rules}\n\nYour objective was this:\n{goal}\n\nYour original plan was this:\n{plan}\n\n\
             You have currently done the following steps:\n{done}\n\n\
             Update your plan accordingly. If no more steps are needed and you can return to the \
             user, respond with {{\"action\": {{\"response\": \"...\"}}}}. Otherwise reply with \
             {{\"action\": {{\"steps\": [\"...\"]}}}} listing only the steps that still NEED to be \
             done. Do not return previously done steps as part of the plan. Reply with JSON only.",
            rules = PLANNING_RULES,
            goal = goal,
            plan = original_plan.numbered(),
            done = done,
        )
    }

    async fn ask(&self, instructions: String, prompt: String) -> Result<String> {
        let request = CompletionRequest::new(instructions, vec![Message::user(prompt)]).json();
        let reply = self.model.complete(request).await?;
        reply
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| OrchestrationError::LlmError("planner returned no content".to_string()))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn create_plan(&self, goal: &str) -> Result<Plan> {
        let raw = self
            .ask(Self::planning_instructions(), goal.to_string())
            .await?;
        let plan = parse_plan(&raw)?;
        debug!(steps = plan.len(), "Model produced plan");
        Ok(plan)
    }

    async fn replan(
        &self,
        goal: &str,
        original_plan: &Plan,
        past_steps: &[PastStep],
    ) -> Result<ReplanAction> {
        let prompt = Self::replanning_prompt(goal, original_plan, past_steps);
        let raw = self
            .ask("You revise plans and reply with JSON only.".to_string(), prompt)
            .await?;
        parse_action(&raw)
    }
}

fn strip_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn clean_steps(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|step| step.trim().to_string())
        .filter(|step| !step.is_empty())
        .collect()
}

pub fn parse_plan(response: &str) -> Result<Plan> {
    let wire: PlanWire = serde_json::from_str(strip_fences(response)).map_err(|e| {
        OrchestrationError::InvalidPlan(format!("Failed to parse plan: {} | raw={}", e, response))
    })?;
    Ok(Plan::new(clean_steps(wire.steps)))
}

/// Accepts `{"action": {...}}` or the bare action object
pub fn parse_action(response: &str) -> Result<ReplanAction> {
    let cleaned = strip_fences(response);

    let action = serde_json::from_str::<ActWire>(cleaned)
        .map(|act| act.action)
        .or_else(|_| serde_json::from_str::<ActionWire>(cleaned))
        .map_err(|e| {
            OrchestrationError::InvalidPlan(format!(
                "Failed to parse replan action: {} | raw={}",
                e, response
            ))
        })?;

    Ok(match action {
        ActionWire::Respond { response } => ReplanAction::Respond(response),
        ActionWire::Plan { steps } => ReplanAction::Continue(Plan::new(clean_steps(steps))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelReply, ScriptedModel};

    #[test]
    fn test_parse_plan_strips_fences_and_blanks() {
        let plan = parse_plan("```json\n{\"steps\": [\"Confirm source account\", \"  \", \"Look up recipient\"]}\n```")
            .unwrap();
        assert_eq!(plan.steps, vec!["Confirm source account", "Look up recipient"]);

        assert!(matches!(
            parse_plan("Sure! Here is the plan"),
            Err(OrchestrationError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_parse_action_shapes() {
        assert_eq!(
            parse_action(r#"{"action": {"response": "You paid John."}}"#).unwrap(),
            ReplanAction::Respond("You paid John.".to_string())
        );
        assert_eq!(
            parse_action(r#"{"steps": ["Execute payment"]}"#).unwrap(),
            ReplanAction::Continue(Plan::new(vec!["Execute payment".to_string()]))
        );
        assert!(parse_action(r#"{"action": {"maybe": true}}"#).is_err());
    }

    #[tokio::test]
    async fn test_replan_prompt_carries_history() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text(
            r#"{"action": {"steps": ["Verify funds"]}}"#,
        )]));
        let planner = LlmPlanner::new(model.clone());

        let original = Plan::new(vec!["Confirm source account".into(), "Verify funds".into()]);
        let past = vec![PastStep {
            step: "Confirm source account".into(),
            result: "Personal Account NL01".into(),
        }];

        let action = planner.replan("pay John", &original, &past).await.unwrap();
        assert_eq!(
            action,
            ReplanAction::Continue(Plan::new(vec!["Verify funds".to_string()]))
        );

        let request = &model.requests()[0];
        assert!(request.json_output);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("1. Confirm source account\n2. Verify funds"));
        assert!(prompt.contains("Result: Personal Account NL01"));
    }

    #[tokio::test]
    async fn test_empty_model_output_is_an_error() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("  ")]));
        let planner = LlmPlanner::new(model);
        assert!(matches!(
            planner.create_plan("pay John").await,
            Err(OrchestrationError::LlmError(_))
        ));
    }
}
