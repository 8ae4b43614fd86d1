//! Tool trait and registry
//!
//! Tools are the uniform invocation surface sub-agents see. Most are thin
//! wrappers over bank REST endpoints; success and failure both reach the
//! model as text.

use crate::error::OrchestrationError;
use crate::models::{RequestContext, ToolCall, ToolOutput, ToolSpec};
use crate::transactions::{AggregateTransactionsTool, BankTransactionSource, TransactionAggregator};
use crate::Result;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod accounts;
pub mod bank;
pub mod customer_data;
pub mod endpoint;
pub mod messages;
pub mod payments;
pub mod preferences;
pub mod tasks;
pub mod time;

pub use bank::{BankApiClient, BankRequest};
pub use endpoint::EndpointTool;

/// Trait for a single callable operation
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value {
        object_schema(json!({}), &[])
    }

    async fn execute(&self, args: &Value, ctx: &RequestContext) -> Result<Value>;
}

/// Tool registry for looking up and executing tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A registry holding only the named tools
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        let mut subset = ToolRegistry::new();
        for name in names {
            match self.get(name) {
                Some(tool) => subset.register(tool),
                None => warn!(tool_name = %name, "Requested tool is not registered"),
            }
        }
        subset
    }

    /// Specs handed to the model, in name order
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Run one call; never fails, errors are folded into the output
    pub async fn invoke(&self, call: &ToolCall, ctx: &RequestContext) -> ToolOutput {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool_name = %call.name, "Tool not registered");
            return ToolOutput::failed(
                OrchestrationError::ToolNotFound(call.name.clone()).to_string(),
            );
        };

        debug!(tool_name = %call.name, "Invoking tool");

        match tool.execute(&call.arguments, ctx).await {
            Ok(data) => ToolOutput::ok(data),
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Tool execution failed");
                ToolOutput::failed(e.to_string())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every bank-backed tool, the transaction aggregator and the local time helpers
pub fn create_default_registry(bank: &Arc<BankApiClient>, max_pages: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let source = Arc::new(BankTransactionSource::new(Arc::clone(bank)));
    let aggregator = Arc::new(TransactionAggregator::new(source, max_pages));
    registry.register(Arc::new(AggregateTransactionsTool::new(aggregator)));

    registry.extend(accounts::tools(bank));
    registry.extend(payments::tools(bank));
    registry.extend(customer_data::tools(bank));
    registry.extend(messages::tools(bank));
    registry.extend(tasks::tools(bank));
    registry.extend(preferences::tools(bank));
    registry.extend(time::tools());

    registry
}

//
// ================= Argument Helpers =================
//

pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn ensure_object(args: &Value) -> Result<&Map<String, Value>> {
    args.as_object().ok_or_else(|| {
        OrchestrationError::InvalidToolInput("tool arguments must be a JSON object".to_string())
    })
}

pub fn optional_str(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn required_str(args: &Value, key: &str) -> Result<String> {
    optional_str(args, key)
        .ok_or_else(|| OrchestrationError::InvalidToolInput(format!("Expected '{}'", key)))
}

pub fn str_or(args: &Value, key: &str, default: &str) -> String {
    optional_str(args, key).unwrap_or_else(|| default.to_string())
}

/// Accepts numbers and numeric strings
pub fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn required_i64(args: &Value, key: &str) -> Result<i64> {
    optional_i64(args, key).ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("Expected integer '{}'", key))
    })
}

pub fn i64_or(args: &Value, key: &str, default: i64) -> i64 {
    optional_i64(args, key).unwrap_or(default)
}

pub fn bool_or(args: &Value, key: &str, default: bool) -> bool {
    match args.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

pub fn string_list(args: &Value, key: &str) -> Result<Vec<String>> {
    let items = args.get(key).and_then(Value::as_array).ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("Expected list '{}'", key))
    })?;

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}
