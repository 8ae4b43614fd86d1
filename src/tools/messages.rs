//! Customer message cards (notifications and bank mail)

use crate::tools::{
    bool_or, object_schema, required_i64, BankApiClient, BankRequest, EndpointTool, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const MESSAGE_CARDS: &str = "/my-abnamro/api/message-card/v1/message-cards";

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    vec![
        EndpointTool::new(
            bank,
            "get_messages",
            "Lists the customer's messages and notifications.",
            object_schema(json!({}), &[]),
            build_list_messages,
        ),
        EndpointTool::new(
            bank,
            "delete_message",
            "Deletes a customer message.",
            object_schema(
                json!({
                    "message_id": {"type": "integer"},
                    "is_bankmail": {"type": "boolean", "default": false}
                }),
                &["message_id"],
            ),
            build_delete_message,
        ),
        EndpointTool::new(
            bank,
            "get_detailed_message",
            "Reads the full content of a customer message.",
            object_schema(
                json!({
                    "message_card_id": {"type": "integer"},
                    "expanded_card_id": {"type": "integer"},
                    "is_bankmail": {"type": "boolean", "default": false}
                }),
                &["message_card_id", "expanded_card_id"],
            ),
            build_detailed_message,
        ),
    ]
}

fn build_list_messages(_args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get(MESSAGE_CARDS))
}

fn build_delete_message(args: &Value) -> Result<BankRequest> {
    let message_id = required_i64(args, "message_id")?;
    Ok(
        BankRequest::put(format!("{}/{}/status", MESSAGE_CARDS, message_id))
            .query("isBankmail", bool_or(args, "is_bankmail", false))
            .json(json!({"status": "DELETE"})),
    )
}

fn build_detailed_message(args: &Value) -> Result<BankRequest> {
    let card = required_i64(args, "message_card_id")?;
    let expanded = required_i64(args, "expanded_card_id")?;
    Ok(BankRequest::get(format!(
        "{}/{}/expanded-cards/{}",
        MESSAGE_CARDS, card, expanded
    ))
    .query("isBankmail", bool_or(args, "is_bankmail", false)))
}
