//! Customer task list (pending approvals and signing requests)

use crate::error::OrchestrationError;
use crate::tools::{
    object_schema, str_or, string_list, BankApiClient, BankRequest, EndpointTool, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    vec![
        EndpointTool::new(
            bank,
            "get_tasks",
            "Lists the customer's open tasks and approval requests.",
            object_schema(json!({}), &[]),
            build_list_tasks,
        ),
        EndpointTool::new(
            bank,
            "delete_task",
            "Deletes one or more customer tasks.",
            object_schema(
                json!({
                    "task_ids": {"type": "array", "items": {"type": "string"}},
                    "source_system": {"type": "string", "default": "GENERIC_SIGNING"}
                }),
                &["task_ids"],
            ),
            build_delete_task,
        ),
    ]
}

fn build_list_tasks(_args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get("/my-abnamro/apis/bapi/tasks/v2/").header("x-xsrf-header", "token"))
}

fn build_delete_task(args: &Value) -> Result<BankRequest> {
    let task_ids = string_list(args, "task_ids")?;
    if task_ids.is_empty() {
        return Err(OrchestrationError::InvalidToolInput(
            "task_ids must not be empty".to_string(),
        ));
    }

    Ok(BankRequest::post("/my-abnamro/apis/bapi/tasks/v2/delete")
        .query("sourceSystem", str_or(args, "source_system", "GENERIC_SIGNING"))
        .header("x-xsrf-header", "token")
        .json(json!({ "taskIds": task_ids })))
}
