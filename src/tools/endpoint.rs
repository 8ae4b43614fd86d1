//! Declarative tool over a single bank endpoint

use crate::models::RequestContext;
use crate::tools::{ensure_object, BankApiClient, BankRequest, Tool};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;

/// Maps validated arguments to the outgoing request
pub type RequestBuilder = fn(&Value) -> Result<BankRequest>;

pub struct EndpointTool {
    name: &'static str,
    description: &'static str,
    parameters: Value,
    build: RequestBuilder,
    bank: Arc<BankApiClient>,
}

impl EndpointTool {
    pub fn new(
        bank: &Arc<BankApiClient>,
        name: &'static str,
        description: &'static str,
        parameters: Value,
        build: RequestBuilder,
    ) -> Arc<dyn Tool> {
        Arc::new(Self {
            name,
            description,
            parameters,
            build,
            bank: Arc::clone(bank),
        })
    }
}

#[async_trait::async_trait]
impl Tool for EndpointTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        ensure_object(args)?;
        let request = (self.build)(args)?;
        Ok(self.bank.send(request, ctx).await)
    }
}
