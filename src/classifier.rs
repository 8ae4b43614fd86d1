//! Routing classifiers
//!
//! Decides which sub-agent owns the next turn. The production router asks
//! the model (see [`crate::supervisor::ModelRouter`]) and falls back to the
//! deterministic [`KeywordRouter`] through [`FallbackRouter`] when the model
//! fails.

use crate::models::{Message, Role};
use crate::subagents::roster::{OPERATIONS_AGENT, PAYMENTS_AGENT, TRANSACTIONS_AGENT};
use crate::subagents::AgentRoster;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Hand the turn to the named sub-agent
    Delegate { agent: String },
    /// Answer directly, no delegation
    Respond { reply: String },
}

#[async_trait]
pub trait RoutingClassifier: Send + Sync {
    async fn route(&self, conversation: &[Message], roster: &AgentRoster) -> Result<RouteDecision>;
}

/// Static keyword lists, scored by substring match
const TRANSACTION_KEYWORDS: &[&str] = &[
    "transaction", "spend", "spent", "spending", "balance", "income", "earned",
    "received", "contract", "how much", "mutation", "statement of",
];

const PAYMENT_KEYWORDS: &[&str] = &[
    "pay", "payment", "transfer", "send money", "beneficiary", "address book",
    "sepa", "recipient",
];

const OPERATION_KEYWORDS: &[&str] = &[
    "phone", "email", "address", "personal data", "date of birth", "message",
    "inbox", "task", "approval request", "newsletter", "preference", "representative",
];

/// Deterministic rule-based router over the latest user message
pub struct KeywordRouter {
    table: Vec<(String, Vec<String>)>,
}

impl KeywordRouter {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Rules for the production roster; unmatched turns go to the roster default
    pub fn banking() -> Self {
        Self::new()
            .rule(TRANSACTIONS_AGENT, TRANSACTION_KEYWORDS)
            .rule(PAYMENTS_AGENT, PAYMENT_KEYWORDS)
            .rule(OPERATIONS_AGENT, OPERATION_KEYWORDS)
    }

    /// Earlier rules win ties
    pub fn rule(mut self, agent: &str, keywords: &[&str]) -> Self {
        self.table.push((
            agent.to_string(),
            keywords.iter().map(|k| k.to_lowercase()).collect(),
        ));
        self
    }

    pub fn classify(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();

        let mut best: Option<(&str, usize)> = None;
        for (agent, keywords) in &self.table {
            let score = keywords
                .iter()
                .filter(|kw| text.contains(kw.as_str()))
                .count();

            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((agent.as_str(), score));
            }
        }

        best.map(|(agent, _)| agent)
    }
}

impl Default for KeywordRouter {
    fn default() -> Self {
        Self::banking()
    }
}

#[async_trait]
impl RoutingClassifier for KeywordRouter {
    async fn route(&self, conversation: &[Message], roster: &AgentRoster) -> Result<RouteDecision> {
        let text = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let agent = self
            .classify(text)
            .unwrap_or(roster.default_agent());

        Ok(RouteDecision::Delegate {
            agent: agent.to_string(),
        })
    }
}

/// Asks `primary` first and `fallback` whenever it errors
pub struct FallbackRouter {
    primary: Arc<dyn RoutingClassifier>,
    fallback: Arc<dyn RoutingClassifier>,
}

impl FallbackRouter {
    pub fn new(primary: Arc<dyn RoutingClassifier>, fallback: Arc<dyn RoutingClassifier>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl RoutingClassifier for FallbackRouter {
    async fn route(&self, conversation: &[Message], roster: &AgentRoster) -> Result<RouteDecision> {
        match self.primary.route(conversation, roster).await {
            Ok(decision) => Ok(decision),
            Err(e) => {
                warn!(error = %e, "Primary router failed, using fallback");
                self.fallback.route(conversation, roster).await
            }
        }
    }
}
