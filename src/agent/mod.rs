//! Plan-execute orchestrator
//!
//! PLAN → APPROVE → EXECUTE → REPLAN → (EXECUTE | DONE)
//!
//! A run is suspended at the approval gate as a persisted [`Checkpoint`] and
//! resumed by presenting its resume token with a decision, possibly from a
//! different process. The checkpoint is written again after every executed
//! step and at every status change.

use crate::audit::AuditLog;
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::execution::StepExecutor;
use crate::models::{
    ApprovalDecision, ApprovalRequest, Checkpoint, PastStep, Plan, ReplanAction, RequestContext,
    RunStatus,
};
use crate::planner::Planner;
use crate::state::CheckpointStore;
use crate::verification::{create_default_verifier, drop_completed_steps, PlanVerifier};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DECLINED_RESPONSE: &str = "The plan was declined. No steps were executed.";
pub const EXPIRED_RESPONSE: &str = "The approval request expired. No steps were executed.";
pub const STALLED_REASON: &str = "run stopped making progress";

/// Human gate used by interactive front ends
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision>;
}

/// Always answers with the same decision
pub struct FixedApproval(pub ApprovalDecision);

#[async_trait]
impl ApprovalPrompt for FixedApproval {
    async fn decide(&self, _request: &ApprovalRequest) -> Result<ApprovalDecision> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorLimits {
    pub max_replans: u32,
    pub max_plan_steps: usize,
    pub approval_ttl: Duration,
    pub run_stale_after: Duration,
}

impl OrchestratorLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_replans: settings.max_replans,
            max_plan_steps: settings.max_plan_steps,
            approval_ttl: settings.approval_ttl,
            run_stale_after: settings.run_stale_after,
        }
    }
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Client-facing view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub resume_token: Uuid,
    pub session_id: Uuid,
    pub goal: String,
    pub status: RunStatus,
    /// Steps still to execute
    pub plan: Vec<String>,
    pub past_steps: Vec<PastStep>,
    pub approval: Option<ApprovalRequest>,
    pub response: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Checkpoint> for RunSnapshot {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            run_id: checkpoint.run_id,
            resume_token: checkpoint.resume_token,
            session_id: checkpoint.session_id,
            goal: checkpoint.goal.clone(),
            status: checkpoint.status,
            plan: checkpoint.plan.steps.clone(),
            past_steps: checkpoint.past_steps.clone(),
            approval: checkpoint.approval.clone(),
            response: checkpoint.response.clone(),
            failure_reason: checkpoint.failure_reason.clone(),
            expires_at: checkpoint.expires_at,
        }
    }
}

pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    verifier: PlanVerifier,
    store: Arc<dyn CheckpointStore>,
    audit_log: Arc<AuditLog>,
    limits: OrchestratorLimits,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        store: Arc<dyn CheckpointStore>,
        audit_log: Arc<AuditLog>,
        limits: OrchestratorLimits,
    ) -> Self {
        Self {
            planner,
            executor,
            verifier: create_default_verifier(limits.max_plan_steps),
            store,
            audit_log,
            limits,
        }
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    /// PLAN and suspend at the approval gate
    pub async fn start(&self, goal: &str, ctx: &RequestContext) -> Result<RunSnapshot> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(OrchestrationError::PlanningError(
                "goal must not be empty".to_string(),
            ));
        }

        let plan = self.planner.create_plan(goal).await?;
        self.verifier.verify_initial(&plan)?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.limits.approval_ttl).map_err(|e| {
            OrchestrationError::ConfigError(format!("approval ttl out of range: {}", e))
        })?;

        let checkpoint = Checkpoint {
            run_id: Uuid::new_v4(),
            resume_token: Uuid::new_v4(),
            session_id: ctx.session_id,
            goal: goal.to_string(),
            original_plan: plan.clone(),
            approval: Some(ApprovalRequest::for_plan(&plan)),
            plan,
            past_steps: Vec::new(),
            status: RunStatus::AwaitingApproval,
            response: None,
            replans_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: Some(now + ttl),
        };

        self.store.save(&checkpoint).await?;

        info!(
            run_id = %checkpoint.run_id,
            session_id = %checkpoint.session_id,
            steps = checkpoint.plan.len(),
            "Plan awaiting approval"
        );

        Ok(RunSnapshot::from(&checkpoint))
    }

    /// Current state of a run. Pending runs past their expiry are expired
    /// here; running runs with no progress within `run_stale_after` are failed.
    pub async fn status(&self, token: Uuid) -> Result<RunSnapshot> {
        let checkpoint = self.find(token).await?;

        match checkpoint.status {
            RunStatus::AwaitingApproval if is_expired(&checkpoint) => {
                self.expire(checkpoint).await
            }
            RunStatus::Running if self.is_stalled(&checkpoint) => {
                self.abandon(checkpoint).await
            }
            _ => Ok(RunSnapshot::from(&checkpoint)),
        }
    }

    /// Session that owns the run, read without touching its state
    pub async fn session_of(&self, token: Uuid) -> Result<Uuid> {
        Ok(self.find(token).await?.session_id)
    }

    /// APPROVE: apply the human decision and, if approved, run to completion
    pub async fn resume(
        &self,
        token: Uuid,
        decision: ApprovalDecision,
        ctx: &RequestContext,
    ) -> Result<RunSnapshot> {
        let mut checkpoint = self.find(token).await?;

        if checkpoint.status != RunStatus::AwaitingApproval {
            return Err(OrchestrationError::InvalidRunState(format!(
                "run {} is {}, not awaiting approval",
                checkpoint.run_id, checkpoint.status
            )));
        }

        if is_expired(&checkpoint) {
            return self.expire(checkpoint).await;
        }

        checkpoint.approval = None;
        checkpoint.updated_at = Utc::now();

        match decision {
            ApprovalDecision::Declined => {
                checkpoint.status = RunStatus::Declined;
                checkpoint.response = Some(DECLINED_RESPONSE.to_string());
                self.transition(&checkpoint).await?;
                self.audit_log.record_run(&checkpoint).await?;

                info!(run_id = %checkpoint.run_id, "Plan declined");
                Ok(RunSnapshot::from(&checkpoint))
            }
            ApprovalDecision::Approved => {
                checkpoint.status = RunStatus::Running;
                self.transition(&checkpoint).await?;

                info!(run_id = %checkpoint.run_id, "Plan approved");
                self.run(checkpoint, ctx).await
            }
        }
    }

    /// Start, ask the prompt, resume
    pub async fn run_interactive(
        &self,
        goal: &str,
        ctx: &RequestContext,
        prompt: &dyn ApprovalPrompt,
    ) -> Result<RunSnapshot> {
        let pending = self.start(goal, ctx).await?;
        let request = pending
            .approval
            .clone()
            .ok_or_else(|| OrchestrationError::StateError("pending run has no approval request".to_string()))?;

        let decision = prompt.decide(&request).await?;
        self.resume(pending.resume_token, decision, ctx).await
    }

    async fn find(&self, token: Uuid) -> Result<Checkpoint> {
        self.store
            .find_by_token(token)
            .await?
            .ok_or_else(|| OrchestrationError::ApprovalNotFound(token.to_string()))
    }

    /// Leave AwaitingApproval; only one caller can win
    async fn transition(&self, checkpoint: &Checkpoint) -> Result<()> {
        if self
            .store
            .save_if_status(RunStatus::AwaitingApproval, checkpoint)
            .await?
        {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidRunState(format!(
                "run {} was already resumed",
                checkpoint.run_id
            )))
        }
    }

    async fn expire(&self, mut checkpoint: Checkpoint) -> Result<RunSnapshot> {
        checkpoint.status = RunStatus::Expired;
        checkpoint.approval = None;
        checkpoint.response = Some(EXPIRED_RESPONSE.to_string());
        checkpoint.updated_at = Utc::now();

        if self
            .store
            .save_if_status(RunStatus::AwaitingApproval, &checkpoint)
            .await?
        {
            warn!(run_id = %checkpoint.run_id, "Approval request expired");
            Ok(RunSnapshot::from(&checkpoint))
        } else {
            // Someone else moved the run on; report what is stored
            let stored = self
                .store
                .load(checkpoint.run_id)
                .await?
                .ok_or_else(|| OrchestrationError::ApprovalNotFound(checkpoint.run_id.to_string()))?;
            Ok(RunSnapshot::from(&stored))
        }
    }

    /// Fail a run whose executing process went away
    async fn abandon(&self, mut checkpoint: Checkpoint) -> Result<RunSnapshot> {
        let last_progress = checkpoint.updated_at;
        checkpoint.status = RunStatus::Failed;
        checkpoint.failure_reason = Some(format!(
            "{} since {}",
            STALLED_REASON,
            last_progress.to_rfc3339()
        ));
        checkpoint.response = Some(format!(
            "I could not complete this request: {}",
            STALLED_REASON
        ));
        checkpoint.updated_at = Utc::now();

        if self
            .store
            .save_if_status(RunStatus::Running, &checkpoint)
            .await?
        {
            warn!(
                run_id = %checkpoint.run_id,
                %last_progress,
                completed_steps = checkpoint.past_steps.len(),
                "Running run stalled, marked failed"
            );
            self.audit_log.record_run(&checkpoint).await?;
            Ok(RunSnapshot::from(&checkpoint))
        } else {
            let stored = self
                .store
                .load(checkpoint.run_id)
                .await?
                .ok_or_else(|| OrchestrationError::ApprovalNotFound(checkpoint.run_id.to_string()))?;
            Ok(RunSnapshot::from(&stored))
        }
    }

    fn is_stalled(&self, checkpoint: &Checkpoint) -> bool {
        match chrono::Duration::from_std(self.limits.run_stale_after) {
            Ok(bound) => Utc::now() - checkpoint.updated_at >= bound,
            Err(_) => false,
        }
    }

    /// EXECUTE / REPLAN until the planner answers or the plan runs out
    async fn run(&self, mut checkpoint: Checkpoint, ctx: &RequestContext) -> Result<RunSnapshot> {
        loop {
            let Some(step) = checkpoint.plan.steps.first().cloned() else {
                let response = checkpoint
                    .past_steps
                    .last()
                    .map(|past| past.result.clone())
                    .unwrap_or_else(|| "Nothing left to do.".to_string());
                return self.complete(checkpoint, response).await;
            };

            debug!(
                run_id = %checkpoint.run_id,
                step_number = checkpoint.past_steps.len() + 1,
                step = %step,
                "Executing step"
            );

            let result = match self.executor.execute(&checkpoint.plan, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(run_id = %checkpoint.run_id, error = %e, "Step failed");
                    format!("Step failed: {}", e)
                }
            };

            checkpoint.past_steps.push(PastStep { step, result });
            checkpoint.plan.steps.remove(0);
            checkpoint.updated_at = Utc::now();
            self.store.save(&checkpoint).await?;

            if checkpoint.replans_count >= self.limits.max_replans {
                let error = OrchestrationError::MaxReplansExceeded(format!(
                    "run {} used all {} replans",
                    checkpoint.run_id, self.limits.max_replans
                ));
                return self.fail(checkpoint, error).await;
            }
            checkpoint.replans_count += 1;

            let action = match self
                .planner
                .replan(&checkpoint.goal, &checkpoint.original_plan, &checkpoint.past_steps)
                .await
            {
                Ok(action) => action,
                Err(e) => return self.fail(checkpoint, e).await,
            };

            match action {
                ReplanAction::Respond(response) if !response.trim().is_empty() => {
                    return self.complete(checkpoint, response).await;
                }
                ReplanAction::Respond(_) => {
                    checkpoint.plan = Plan::default();
                }
                ReplanAction::Continue(plan) => {
                    let plan = drop_completed_steps(plan, &checkpoint.past_steps);
                    if let Err(e) = self.verifier.verify_replan(&plan) {
                        return self.fail(checkpoint, e).await;
                    }
                    checkpoint.plan = plan;
                }
            }

            checkpoint.updated_at = Utc::now();
            self.store.save(&checkpoint).await?;

            debug!(
                run_id = %checkpoint.run_id,
                remaining = checkpoint.plan.len(),
                replans = checkpoint.replans_count,
                "Replanned"
            );
        }
    }

    async fn complete(&self, mut checkpoint: Checkpoint, response: String) -> Result<RunSnapshot> {
        checkpoint.status = RunStatus::Completed;
        checkpoint.plan = Plan::default();
        checkpoint.response = Some(response);
        checkpoint.updated_at = Utc::now();

        self.store.save(&checkpoint).await?;
        self.audit_log.record_run(&checkpoint).await?;

        info!(
            run_id = %checkpoint.run_id,
            steps = checkpoint.past_steps.len(),
            replans = checkpoint.replans_count,
            "Run completed"
        );

        Ok(RunSnapshot::from(&checkpoint))
    }

    async fn fail(&self, mut checkpoint: Checkpoint, error: OrchestrationError) -> Result<RunSnapshot> {
        warn!(
            run_id = %checkpoint.run_id,
            error = %error,
            completed_steps = checkpoint.past_steps.len(),
            "Run failed"
        );

        checkpoint.status = RunStatus::Failed;
        checkpoint.failure_reason = Some(error.to_string());
        checkpoint.response = Some(format!(
            "I could not complete this request: {}",
            error
        ));
        checkpoint.updated_at = Utc::now();

        self.store.save(&checkpoint).await?;
        self.audit_log.record_run(&checkpoint).await?;

        Ok(RunSnapshot::from(&checkpoint))
    }
}

fn is_expired(checkpoint: &Checkpoint) -> bool {
    checkpoint
        .expires_at
        .map_or(false, |expires_at| Utc::now() >= expires_at)
}
