//! `aggregate_transactions`: the aggregator exposed as a tool

use crate::models::RequestContext;
use crate::tools::time::now_in_amsterdam;
use crate::tools::{object_schema, optional_str, required_str, Tool};
use crate::transactions::{
    AmountField, DateWindow, Direction, TransactionAggregator, TransactionQuery,
};
use crate::error::OrchestrationError;
use crate::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct AggregateTransactionsTool {
    aggregator: Arc<TransactionAggregator>,
}

impl AggregateTransactionsTool {
    pub fn new(aggregator: Arc<TransactionAggregator>) -> Self {
        Self { aggregator }
    }

    fn query_from(args: &Value, today: NaiveDate) -> Result<TransactionQuery> {
        let window = DateWindow::new(
            parse_date(&required_str(args, "start_date")?)?,
            parse_date(&required_str(args, "end_date")?)?,
            today,
        )?;

        let direction = optional_str(args, "direction")
            .filter(|d| !d.eq_ignore_ascii_case("BOTH"))
            .map(|d| Direction::parse(&d))
            .transpose()?;

        let amount_field = optional_str(args, "amount_field")
            .map(AmountField)
            .unwrap_or_default();

        Ok(TransactionQuery::new(required_str(args, "account_number")?, window)
            .with_direction(direction)
            .with_amount_field(amount_field))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        OrchestrationError::InvalidToolInput(format!("Expected YYYY-MM-DD date, got {:?}", raw))
    })
}

#[async_trait::async_trait]
impl Tool for AggregateTransactionsTool {
    fn name(&self) -> &str {
        "aggregate_transactions"
    }

    fn description(&self) -> &str {
        "Fetches every page of transactions for an account and sums the amounts between \
         start_date (inclusive) and end_date (exclusive, not after today). \
         Use direction DEBIT for spending and CREDIT for income."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "account_number": {"type": "string"},
                "start_date": {"type": "string", "description": "YYYY-MM-DD, inclusive"},
                "end_date": {"type": "string", "description": "YYYY-MM-DD, exclusive"},
                "direction": {"type": "string", "enum": ["DEBIT", "CREDIT", "BOTH"]},
                "amount_field": {"type": "string", "default": "amount"}
            }),
            &["account_number", "start_date", "end_date"],
        )
    }

    async fn execute(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        let today = now_in_amsterdam().date_naive();
        let query = Self::query_from(args, today)?;
        let report = self.aggregator.aggregate(&query, ctx).await?;

        let mut body = serde_json::to_value(&report)?;
        body["summary"] = json!(report.summary());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::{TransactionPage, TransactionSource};
    use async_trait::async_trait;

    struct OnePage;

    #[async_trait]
    impl TransactionSource for OnePage {
        async fn fetch_page(
            &self,
            _query: &TransactionQuery,
            _token: Option<&str>,
            _ctx: &RequestContext,
        ) -> Result<TransactionPage> {
            Ok(TransactionPage {
                records: vec![json!({"amount": -42.0, "transactionDate": "2020-01-02"})],
                next_token: None,
            })
        }
    }

    fn tool() -> AggregateTransactionsTool {
        AggregateTransactionsTool::new(Arc::new(TransactionAggregator::new(Arc::new(OnePage), 10)))
    }

    #[test]
    fn test_query_from_arguments() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let query = AggregateTransactionsTool::query_from(
            &json!({
                "account_number": "NL01",
                "start_date": "2025-07-01",
                "end_date": "2025-07-15",
                "direction": "debit"
            }),
            today,
        )
        .unwrap();

        assert_eq!(query.direction, Some(Direction::Debit));
        assert_eq!(query.amount_field, AmountField::default());

        let future = AggregateTransactionsTool::query_from(
            &json!({"account_number": "NL01", "start_date": "2025-07-01", "end_date": "2025-07-16"}),
            today,
        );
        assert!(matches!(future, Err(OrchestrationError::InvalidToolInput(_))));
    }

    #[tokio::test]
    async fn test_execute_reports_summary() {
        let out = tool()
            .execute(
                &json!({
                    "account_number": "NL01",
                    "start_date": "2020-01-01",
                    "end_date": "2020-02-01",
                    "direction": "BOTH"
                }),
                &RequestContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(out["total"], -42.0);
        assert_eq!(out["window"]["start"], "2020-01-01");
        assert_eq!(out["window"]["end"], "2020-02-01");
        assert!(out["summary"].as_str().unwrap().contains("-42.00"));
    }
}
