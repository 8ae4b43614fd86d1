//! Planner trait and implementations
//!
//! The planner decomposes a goal into ordered steps and, after every
//! executed step, decides whether to answer or to continue with a revised
//! list of remaining steps.

use crate::error::OrchestrationError;
use crate::models::{PastStep, Plan, ReplanAction};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod llm;
pub use llm::LlmPlanner;

#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(&self, goal: &str) -> Result<Plan>;

    /// Given the goal, the original plan and everything done so far
    async fn replan(
        &self,
        goal: &str,
        original_plan: &Plan,
        past_steps: &[PastStep],
    ) -> Result<ReplanAction>;
}

/// Planner with canned output, for tests and offline runs
pub struct ScriptedPlanner {
    plan: Plan,
    replans: Mutex<VecDeque<ReplanAction>>,
    replan_calls: Mutex<Vec<Vec<PastStep>>>,
}

impl ScriptedPlanner {
    pub fn new(steps: &[&str], replans: Vec<ReplanAction>) -> Self {
        Self {
            plan: Plan::new(steps.iter().map(|s| s.to_string()).collect()),
            replans: Mutex::new(replans.into()),
            replan_calls: Mutex::new(Vec::new()),
        }
    }

    /// Past steps seen by each replan call, in order
    pub fn replan_calls(&self) -> Vec<Vec<PastStep>> {
        self.replan_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn create_plan(&self, _goal: &str) -> Result<Plan> {
        Ok(self.plan.clone())
    }

    async fn replan(
        &self,
        _goal: &str,
        _original_plan: &Plan,
        past_steps: &[PastStep],
    ) -> Result<ReplanAction> {
        if let Ok(mut calls) = self.replan_calls.lock() {
            calls.push(past_steps.to_vec());
        }

        self.replans
            .lock()
            .map_err(|_| OrchestrationError::PlanningError("scripted planner poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| {
                OrchestrationError::PlanningError("scripted planner has no replan left".to_string())
            })
    }
}
