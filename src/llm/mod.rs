//! Language model seam
//!
//! Sub-agents, the supervisor and the planner all talk to the model through
//! [`ChatModel`], so a scripted model can stand in for the real endpoint.

use crate::error::OrchestrationError;
use crate::models::{Message, ToolCall, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod azure;
pub use azure::AzureChatClient;

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub instructions: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Ask the model for a single JSON object instead of prose
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new(instructions: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            instructions: instructions.into(),
            messages,
            tools: Vec::new(),
            json_output: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn call(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                name: name.to_string(),
                arguments,
            }],
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply>;
}

/// Replays canned replies in order and records every request.
/// Keeps the agents testable without a model endpoint.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        self.replies
            .lock()
            .map_err(|_| OrchestrationError::LlmError("scripted model poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| OrchestrationError::LlmError("scripted model exhausted".to_string()))
    }
}
