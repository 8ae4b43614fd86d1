//! Core data models for the banking assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Agent that authored the message (assistant) or tool that produced it (tool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant message attributed to a named agent
    pub fn from_agent(agent: &str, content: impl Into<String>) -> Self {
        Self {
            name: Some(agent.to_string()),
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Assistant message that requests tool invocations
    pub fn tool_request(agent: &str, content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            name: Some(agent.to_string()),
            tool_calls: calls,
            ..Self::new(Role::Assistant, content.unwrap_or_default())
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            name: Some(call.name.clone()),
            tool_call_id: Some(call.id.clone()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn is_final_answer(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.is_empty()
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Name + description + JSON schema handed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: serde_json::json!({ "error": error }),
            error: Some(error),
        }
    }

    /// Text handed to the model; success and failure look the same to it
    pub fn to_content(&self) -> String {
        match &self.data {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Per-request values forwarded to tools
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub session_id: Uuid,
    /// Session cookie forwarded to the bank REST endpoints
    pub cookie: Option<String>,
}

impl RequestContext {
    pub fn new(session_id: Uuid, cookie: Option<String>) -> Self {
        Self { session_id, cookie }
    }
}

//
// ================= Plan =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<String>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Numbered listing, one step per line
    pub fn numbered(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PastStep {
    pub step: String,
    pub result: String,
}

/// Outcome of a replanning call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplanAction {
    Respond(String),
    Continue(Plan),
}

//
// ================= Approval =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApprovalDecision {
    #[serde(alias = "approve", alias = "accept")]
    Approved,
    #[serde(alias = "decline", alias = "reject")]
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub action: String,
    pub description: String,
    pub plan: String,
    pub allowed_responses: Vec<String>,
}

impl ApprovalRequest {
    pub fn for_plan(plan: &Plan) -> Self {
        Self {
            action: "Approve or Decline".to_string(),
            description: "Please review the plan before execution".to_string(),
            plan: plan.numbered(),
            allowed_responses: vec!["approved".to_string(), "declined".to_string()],
        }
    }
}

//
// ================= Run Checkpoint =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    AwaitingApproval,
    Running,
    Completed,
    Declined,
    Expired,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Declined | RunStatus::Expired | RunStatus::Failed
        )
    }
}

/// Serializable plan-execute state; persisted at every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: Uuid,
    /// Token the approval decision must present to resume the run
    pub resume_token: Uuid,
    pub session_id: Uuid,
    pub goal: String,
    pub original_plan: Plan,
    /// Steps still to execute
    pub plan: Plan,
    pub past_steps: Vec<PastStep>,
    pub status: RunStatus,
    #[serde(default)]
    pub approval: Option<ApprovalRequest>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub replans_count: u32,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

//
// ================= Audit =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub audit_id: Uuid,
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub goal: String,
    pub original_plan: Plan,
    pub past_steps: Vec<PastStep>,
    pub status: RunStatus,
    pub response: Option<String>,
    pub failure_reason: Option<String>,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::AwaitingApproval => "awaiting_approval",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Declined => "declined",
            RunStatus::Expired => "expired",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_decision_wire_format() {
        let approved: ApprovalDecision =
            serde_json::from_str(r#"{"type":"approved"}"#).unwrap();
        assert_eq!(approved, ApprovalDecision::Approved);

        let declined: ApprovalDecision = serde_json::from_str(r#"{"type":"decline"}"#).unwrap();
        assert_eq!(declined, ApprovalDecision::Declined);

        assert!(serde_json::from_str::<ApprovalDecision>(r#"{"type":"maybe"}"#).is_err());
    }

    #[test]
    fn test_plan_numbering() {
        let plan = Plan::new(vec![
            "Confirm source account".to_string(),
            "Look up recipient".to_string(),
        ]);
        assert_eq!(plan.numbered(), "1. Confirm source account\n2. Look up recipient");

        let request = ApprovalRequest::for_plan(&plan);
        assert_eq!(request.allowed_responses, vec!["approved", "declined"]);
    }

    #[test]
    fn test_tool_output_text() {
        let failed = ToolOutput::failed("Tool not registered");
        assert!(!failed.success);
        assert_eq!(failed.to_content(), r#"{"error":"Tool not registered"}"#);

        let text = ToolOutput::ok(serde_json::json!("12:00"));
        assert_eq!(text.to_content(), "12:00");
    }
}
