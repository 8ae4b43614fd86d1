//! Azure OpenAI chat-completions client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::LlmSettings;
use crate::error::OrchestrationError;
use crate::llm::{ChatModel, CompletionRequest, ModelReply};
use crate::models::{Message, Role, ToolCall, ToolSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Reusable Azure OpenAI client (connection-pooled)
pub struct AzureChatClient {
    client: Client,
    api_key: String,
    url: String,
}

impl AzureChatClient {
    pub fn new(settings: &LlmSettings) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.endpoint.trim_end_matches('/'),
            settings.deployment,
            settings.api_version
        );

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            url,
        })
    }
}

#[async_trait]
impl ChatModel for AzureChatClient {
    async fn complete(&self, request: CompletionRequest) -> crate::Result<ModelReply> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::PlanningError(
                "AZURE_OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let body = ChatCompletionRequest::from_request(&request);

        debug!(
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(Vec::len).unwrap_or(0),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completions request failed: {}", e);
                OrchestrationError::LlmError(format!("Chat completions error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Chat completions error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Chat completions returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completions response: {}", e);
            OrchestrationError::LlmError(format!("Chat completions parse error: {}", e))
        })?;

        parsed.into_reply()
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    fn from_request(request: &CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(request.instructions.clone()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        });
        messages.extend(request.messages.iter().map(WireMessage::from_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(WireTool::from_spec).collect())
        };

        Self {
            messages,
            tools,
            temperature: 0.0,
            response_format: request.json_output.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        let content = if message.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(message.content.clone())
        };

        Self {
            role: message.role.to_string(),
            content,
            // Tool messages are correlated by id; `name` is only meaningful for authors
            name: match message.role {
                Role::Tool => None,
                _ => message.name.clone(),
            },
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

impl WireTool {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            kind: "function".to_string(),
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments, as sent by the API
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

impl ChatCompletionResponse {
    fn into_reply(self) -> crate::Result<ModelReply> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            OrchestrationError::LlmError("No choices in chat completions response".to_string())
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                // Malformed arguments are passed through as a string; the tool
                // rejects them and the model sees the rejection.
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::String(call.function.arguments)),
            })
            .collect();

        Ok(ModelReply {
            content: choice.message.content.filter(|c| !c.trim().is_empty()),
            tool_calls,
        })
    }
}
