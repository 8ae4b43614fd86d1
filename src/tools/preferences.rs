//! Communication preferences

use crate::tools::{object_schema, required_str, str_or, BankApiClient, BankRequest, EndpointTool, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    vec![EndpointTool::new(
        bank,
        "get_newsletter_settings",
        "Fetches the customer's newsletter subscriptions.",
        object_schema(
            json!({
                "bcnumber": {"type": "string", "description": "Business contact number"},
                "cgc_code": {"type": "string", "default": "0213"}
            }),
            &["bcnumber"],
        ),
        build_newsletter_settings,
    )]
}

fn build_newsletter_settings(args: &Value) -> Result<BankRequest> {
    Ok(
        BankRequest::get("/customer-communication-preferences/v1/newsletters")
            .query("cgcCode", str_or(args, "cgc_code", "0213"))
            .header("bcnumber", required_str(args, "bcnumber")?),
    )
}
