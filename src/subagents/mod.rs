//! Sub-agents
//!
//! A sub-agent binds a model, fixed instructions and a tool subset, and
//! resolves one conversation turn. It returns only the messages it produced
//! (tool requests, tool results, final answer) so the caller can merge them
//! into the shared history verbatim.

use crate::llm::{ChatModel, CompletionRequest};
use crate::models::{Message, RequestContext};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod knowledge;
pub mod roster;

pub use knowledge::{FaqEntry, KnowledgeAgent, KnowledgeBase};
pub use roster::{build_roster, AgentRoster};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Capability description shown to the router
    fn description(&self) -> &str;

    async fn invoke(&self, messages: &[Message], ctx: &RequestContext) -> Result<Vec<Message>>;
}

/// Bounded tool-using loop: ask the model, run the requested tools, feed the
/// results back, until the model answers in plain text.
pub struct ToolAgent {
    name: String,
    description: String,
    instructions: String,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_tool_rounds: usize,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            model,
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, messages: &[Message], ctx: &RequestContext) -> Result<Vec<Message>> {
        let mut transcript = messages.to_vec();
        let mut produced = Vec::new();
        let specs = self.tools.specs();

        for round in 0..self.max_tool_rounds {
            let request = CompletionRequest::new(self.instructions.clone(), transcript.clone())
                .with_tools(specs.clone());
            let reply = self.model.complete(request).await?;

            if reply.tool_calls.is_empty() {
                debug!(agent = %self.name, round, "Agent answered");
                produced.push(Message::from_agent(
                    &self.name,
                    reply.content.unwrap_or_default(),
                ));
                return Ok(produced);
            }

            info!(
                agent = %self.name,
                round,
                calls = reply.tool_calls.len(),
                "Agent requested tools"
            );

            let calls = reply.tool_calls.clone();
            let request_message = Message::tool_request(&self.name, reply.content, reply.tool_calls);
            transcript.push(request_message.clone());
            produced.push(request_message);

            for call in &calls {
                let output = self.tools.invoke(call, ctx).await;
                let result = Message::tool_result(call, output.to_content());
                transcript.push(result.clone());
                produced.push(result);
            }
        }

        warn!(
            agent = %self.name,
            rounds = self.max_tool_rounds,
            "Agent did not answer within its tool budget"
        );
        produced.push(Message::from_agent(
            &self.name,
            format!(
                "I could not finish this request within {} tool rounds.",
                self.max_tool_rounds
            ),
        ));
        Ok(produced)
    }
}
