//! Paginated transaction aggregation
//!
//! Walks the continuation-token protocol of the transaction listing until
//! the server stops returning a token, filters records to the requested
//! window client-side and sums one numeric field. The walk is bounded: a
//! repeated token or too many pages ends with
//! [`OrchestrationError::PaginationDidNotTerminate`].

use crate::error::OrchestrationError;
use crate::models::RequestContext;
use crate::tools::accounts::build_get_transactions;
use crate::tools::bank::is_error_object;
use crate::tools::time::{in_amsterdam, local_midnight_millis};
use crate::tools::BankApiClient;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod tool;
pub use tool::AggregateTransactionsTool;

const DATE_FIELDS: &[&str] = &["transactionDate", "bookDate", "valueDate"];

//
// ================= Query =================
//

/// Half-open date range: `start` is included, `end` is not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Rejects empty windows and windows reaching past `today`
    pub fn new(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "end date {} must be after start date {}",
                end, start
            )));
        }

        if end > today {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "end date {} is in the future (today is {})",
                end, today
            )));
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (inclusive) to {} (exclusive)", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Outgoing money, negative amounts
    Debit,
    /// Incoming money, positive amounts
    Credit,
}

impl Direction {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "DEBIT" => Ok(Direction::Debit),
            "CREDIT" => Ok(Direction::Credit),
            other => Err(OrchestrationError::InvalidToolInput(format!(
                "direction must be DEBIT or CREDIT, got {}",
                other
            ))),
        }
    }

    pub fn as_remote(&self) -> &'static str {
        match self {
            Direction::Debit => "DEBIT",
            Direction::Credit => "CREDIT",
        }
    }

    fn matches(&self, cents: i64) -> bool {
        match self {
            Direction::Debit => cents < 0,
            Direction::Credit => cents > 0,
        }
    }
}

/// Record field that gets summed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountField(pub String);

impl Default for AmountField {
    fn default() -> Self {
        Self("amount".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub account_number: String,
    pub window: DateWindow,
    /// `None` takes both directions
    pub direction: Option<Direction>,
    pub amount_field: AmountField,
}

impl TransactionQuery {
    pub fn new(account_number: impl Into<String>, window: DateWindow) -> Self {
        Self {
            account_number: account_number.into(),
            window,
            direction: None,
            amount_field: AmountField::default(),
        }
    }

    pub fn with_direction(mut self, direction: Option<Direction>) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_amount_field(mut self, field: AmountField) -> Self {
        self.amount_field = field;
        self
    }
}

//
// ================= Source =================
//

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPage {
    pub records: Vec<Value>,
    /// Continuation token for the next page
    pub next_token: Option<String>,
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &TransactionQuery,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<TransactionPage>;
}

/// Pages through the bank's mutation listing
pub struct BankTransactionSource {
    bank: Arc<BankApiClient>,
}

impl BankTransactionSource {
    pub fn new(bank: Arc<BankApiClient>) -> Self {
        Self { bank }
    }
}

#[async_trait]
impl TransactionSource for BankTransactionSource {
    async fn fetch_page(
        &self,
        query: &TransactionQuery,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<TransactionPage> {
        let mut args = json!({
            "account_number": query.account_number,
            "include_actions": "EXTENDED",
            "book_date_from": local_midnight_millis(query.window.start)?,
            "book_date_to": local_midnight_millis(query.window.end)?,
        });
        if let Some(token) = token {
            args["last_mutation_key"] = json!(token);
        }
        if let Some(direction) = query.direction {
            args["transaction_type"] = json!(direction.as_remote());
        }

        let request = build_get_transactions(&args)?;
        let body = self.bank.send(request, ctx).await;
        parse_page(&body)
    }
}

/// Reads `mutationsList.{mutations, lastMutationKey}`, falling back to the
/// same keys at the top level
pub fn parse_page(body: &Value) -> Result<TransactionPage> {
    if is_error_object(body) {
        return Err(OrchestrationError::ToolError(format!(
            "transaction listing failed: {}",
            body["error"].as_str().unwrap_or("unknown error")
        )));
    }

    let list = body.get("mutationsList").unwrap_or(body);

    let records = list
        .get("mutations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.get("mutation").unwrap_or(item).clone())
                .collect()
        })
        .unwrap_or_default();

    let next_token = list
        .get("lastMutationKey")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Ok(TransactionPage {
        records,
        next_token,
    })
}

//
// ================= Aggregation =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub account_number: String,
    /// Window actually covered, echoed back
    pub window: DateWindow,
    pub direction: Option<Direction>,
    pub amount_field: AmountField,
    pub total: f64,
    pub currency: Option<String>,
    pub record_count: usize,
    pub pages_fetched: usize,
}

impl AggregationReport {
    pub fn summary(&self) -> String {
        format!(
            "Total {:.2} {} over {} transaction(s) from {}",
            self.total,
            self.currency.as_deref().unwrap_or(""),
            self.record_count,
            self.window
        )
    }
}

pub struct TransactionAggregator {
    source: Arc<dyn TransactionSource>,
    max_pages: usize,
}

impl TransactionAggregator {
    pub fn new(source: Arc<dyn TransactionSource>, max_pages: usize) -> Self {
        Self {
            source,
            max_pages: max_pages.max(1),
        }
    }

    pub async fn aggregate(
        &self,
        query: &TransactionQuery,
        ctx: &RequestContext,
    ) -> Result<AggregationReport> {
        info!(
            account = %query.account_number,
            window = %query.window,
            "Aggregating transactions"
        );

        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        let mut total_cents = 0i64;
        let mut record_count = 0usize;
        let mut currency: Option<String> = None;

        loop {
            if pages >= self.max_pages {
                warn!(pages, "Pagination bound reached");
                return Err(OrchestrationError::PaginationDidNotTerminate {
                    pages,
                    last_token: token,
                });
            }

            let page = self
                .source
                .fetch_page(query, token.as_deref(), ctx)
                .await?;
            pages += 1;

            debug!(page = pages, records = page.records.len(), "Fetched page");

            for record in &page.records {
                let Some(cents) = include_record(record, query) else {
                    continue;
                };

                total_cents = total_cents.checked_add(cents).ok_or_else(|| {
                    OrchestrationError::ToolError("transaction total overflowed".to_string())
                })?;
                record_count += 1;
                if currency.is_none() {
                    currency = record
                        .get("currencyIsoCode")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }

            match page.next_token.filter(|next| !next.is_empty()) {
                None => break,
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        warn!(token = %next, "Continuation token repeated");
                        return Err(OrchestrationError::PaginationDidNotTerminate {
                            pages,
                            last_token: Some(next),
                        });
                    }
                    token = Some(next);
                }
            }
        }

        let report = AggregationReport {
            account_number: query.account_number.clone(),
            window: query.window,
            direction: query.direction,
            amount_field: query.amount_field.clone(),
            total: total_cents as f64 / 100.0,
            currency,
            record_count,
            pages_fetched: pages,
        };

        info!(
            total = report.total,
            records = report.record_count,
            pages = report.pages_fetched,
            "Aggregation complete"
        );

        Ok(report)
    }
}

/// Amount in cents when the record belongs to the query, otherwise `None`
fn include_record(record: &Value, query: &TransactionQuery) -> Option<i64> {
    let Some(date) = record_date(record) else {
        debug!("Skipping record without a readable date");
        return None;
    };
    if !query.window.contains(date) {
        return None;
    }

    let Some(cents) = record.get(&query.amount_field.0).and_then(amount_cents) else {
        debug!(field = %query.amount_field.0, "Skipping record without a readable amount");
        return None;
    };

    match query.direction {
        Some(direction) if !direction.matches(cents) => None,
        _ => Some(cents),
    }
}

fn record_date(record: &Value) -> Option<NaiveDate> {
    DATE_FIELDS
        .iter()
        .filter_map(|field| record.get(*field))
        .find_map(parse_date)
}

/// `YYYY-MM-DD`, `YYYYMMDD` or epoch milliseconds (read in Amsterdam time)
fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_i64().and_then(date_from_millis),
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(date_from_millis))
        }
        _ => None,
    }
}

fn date_from_millis(millis: i64) -> Option<NaiveDate> {
    let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(in_amsterdam(utc).date_naive())
}

fn amount_cents(value: &Value) -> Option<i64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };

    let cents = (amount * 100.0).round();
    if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
        debug!(amount, "Skipping amount outside the representable range");
        return None;
    }
    Some(cents as i64)
}
