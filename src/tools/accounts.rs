//! Balances, contracts and transaction listing

use crate::error::OrchestrationError;
use crate::tools::{
    object_schema, optional_i64, optional_str, required_str, str_or, BankApiClient, BankRequest,
    EndpointTool, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const PRODUCT_GROUPS: &[&str] = &[
    "PAYMENT_ACCOUNTS",
    "SAVINGS_ACCOUNTS",
    "INVESTMENTS",
    "FISCAL_CAPITAL_SOLUTIONS",
    "FISCAL_CAPITAL_SOLUTIONS_PRODUCTS",
    "MORTGAGE",
    "DEPOSITS",
];

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    vec![
        EndpointTool::new(
            bank,
            "get_account_balance_list",
            "Lists the customer's accounts with their current balances.",
            object_schema(json!({}), &[]),
            build_balance_list,
        ),
        EndpointTool::new(
            bank,
            "get_payments_contracts_list",
            "Fetches the list of accounts for the user. The main account is called 'Personal Account'.",
            object_schema(json!({}), &[]),
            build_contracts_list,
        ),
        EndpointTool::new(
            bank,
            "get_transactions",
            "Lists transactions for an account, one page at a time. Pass the returned \
             lastMutationKey as last_mutation_key to fetch the next page; omit it on the first call. \
             book_date_from / book_date_to are millisecond timestamps at 00:00:00.",
            object_schema(
                json!({
                    "account_number": {"type": "string"},
                    "last_mutation_key": {"type": "string"},
                    "include_actions": {"type": "string", "default": "EXTENDED"},
                    "transaction_type": {"type": "string", "enum": ["CREDIT", "DEBIT"]},
                    "book_date_from": {"type": "integer"},
                    "book_date_to": {"type": "integer"}
                }),
                &["account_number"],
            ),
            build_get_transactions,
        ),
    ]
}

fn build_balance_list(_args: &Value) -> Result<BankRequest> {
    let request = PRODUCT_GROUPS.iter().fold(
        BankRequest::get("/my-abnamro/apis/account-balances/v2/"),
        |request, group| request.query("productGroups", group),
    );

    Ok(request
        .query("excludeBlocked", false)
        .header("x-xsrf-header", "token"))
}

fn build_contracts_list(_args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::post("/my-abnamro/api/payments/contracts/list")
        .header("consumer-id", "aabsys020419-retail-digitalshop")
        .json(json!({
            "actionNames": [
                "VIEW_PORTFOLIO_OVERVIEW", "VIEW_PAYMENTS", "APM_ADVISE_CONTRACTFILTER",
                "MANAGE_DOMESTIC_PAYMENTS", "MANAGE_INTERNATIONAL_PAYMENTS", "SIGN_DOMESTIC_PAYMENTS",
                "SIGN_INTERNATIONAL_PAYMENTS", "SIGN_STANDING_ORDER", "VIEW_PROFILE_FUND_SETTINGS",
                "VIEW_WEALTH_OVERVIEW"
            ],
            "productBuildingBlocks": [5, 8, 20, 25, 15],
            "productGroups": &PRODUCT_GROUPS[..PRODUCT_GROUPS.len() - 1],
            "balanceTypes": ["IBMR", "ITBD"],
            "excludeBlocked": false,
            "contractIds": []
        })))
}

/// Shared with the transaction aggregator so both paginate the same way
pub fn build_get_transactions(args: &Value) -> Result<BankRequest> {
    let account_number = required_str(args, "account_number")?;

    let transaction_type = optional_str(args, "transaction_type")
        .map(|t| t.to_uppercase())
        .map(|t| match t.as_str() {
            "CREDIT" | "DEBIT" => Ok(t),
            other => Err(OrchestrationError::InvalidToolInput(format!(
                "transaction_type must be CREDIT or DEBIT, got {}",
                other
            ))),
        })
        .transpose()?;

    Ok(BankRequest::get(format!("/mutations/{}", account_number))
        .query("accountNumber", &account_number)
        .query("includeActions", str_or(args, "include_actions", "EXTENDED"))
        .query_opt("lastMutationKey", optional_str(args, "last_mutation_key"))
        .query_opt("cdIndicatorAmountFrom", transaction_type.as_ref())
        .query_opt("cdIndicatorAmountTo", transaction_type.as_ref())
        .query_opt("bookDateFrom", optional_i64(args, "book_date_from"))
        .query_opt("bookDateTo", optional_i64(args, "book_date_to"))
        .header("x-aab-serviceversion", "v3"))
}
