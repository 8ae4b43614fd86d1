//! Fixed-answer knowledge path
//!
//! Product and self-service questions are answered from a small FAQ table
//! first; anything the table does not cover goes to the model without tools.

use crate::error::OrchestrationError;
use crate::llm::{ChatModel, CompletionRequest};
use crate::models::{Message, RequestContext, Role};
use crate::subagents::Agent;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const KNOWLEDGE_AGENT: &str = "KnowledgeAgent";

const INSTRUCTIONS: &str = "You answer general questions about banking products, services \
and self-service options in the app and on the website. You cannot see customer data or \
make changes. Keep answers to one or two short paragraphs.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    /// Lowercase terms; the entry matches when enough of them occur
    pub keywords: Vec<String>,
}

impl FaqEntry {
    pub fn new(question: &str, answer: &str, keywords: &[&str]) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn score(&self, text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count()
    }

    fn required_score(&self) -> usize {
        self.keywords.len().min(2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    entries: Vec<FaqEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<FaqEntry> = serde_json::from_str(raw)?;
        if entries.iter().any(|entry| entry.keywords.is_empty()) {
            return Err(OrchestrationError::ConfigError(
                "every FAQ entry needs at least one keyword".to_string(),
            ));
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best-scoring entry that meets its keyword threshold
    pub fn lookup(&self, question: &str) -> Option<&FaqEntry> {
        let text = question.to_lowercase();

        self.entries
            .iter()
            .map(|entry| (entry.score(&text), entry))
            .filter(|(score, entry)| *score > 0 && *score >= entry.required_score())
            .max_by_key(|(score, _)| *score)
            .map(|(_, entry)| entry)
    }

    /// Self-service answers shipped with the assistant
    pub fn builtin() -> Self {
        Self::new(vec![
            FaqEntry::new(
                "How do I block my debit card?",
                "You can block your card straight away in the app under Profile > Cards > \
                 Block card. If you no longer have access to the app, call the bank's \
                 card blocking line, which is available 24/7.",
                &["card", "block", "lost", "stolen"],
            ),
            FaqEntry::new(
                "Where do I find my IBAN?",
                "Your IBAN is shown under the account name on the overview screen of the app \
                 and at the top of every account statement.",
                &["iban", "find", "where", "account number"],
            ),
            FaqEntry::new(
                "How do I change my spending limits?",
                "Open the app, choose the card and go to Limits. Changes to daily payment \
                 and withdrawal limits take effect immediately.",
                &["limit", "change", "spending", "withdrawal"],
            ),
            FaqEntry::new(
                "How do I open a savings account?",
                "You can open a savings account in the app under Products > Savings. The \
                 account is usually available within a few minutes.",
                &["savings", "open", "account"],
            ),
            FaqEntry::new(
                "How do I download an account statement?",
                "Statements can be downloaded from the website under Accounts > Statements, \
                 as PDF or in a spreadsheet-friendly format.",
                &["statement", "download", "pdf", "export"],
            ),
        ])
    }
}

pub struct KnowledgeAgent {
    description: String,
    knowledge_base: KnowledgeBase,
    model: Arc<dyn ChatModel>,
}

impl KnowledgeAgent {
    pub fn new(knowledge_base: KnowledgeBase, model: Arc<dyn ChatModel>) -> Self {
        Self {
            description: "Answers questions about banking products and services, FAQs and \
                          general inquiries, and guides users to self-service options."
                .to_string(),
            knowledge_base,
            model,
        }
    }
}

#[async_trait]
impl Agent for KnowledgeAgent {
    fn name(&self) -> &str {
        KNOWLEDGE_AGENT
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, messages: &[Message], _ctx: &RequestContext) -> Result<Vec<Message>> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if let Some(entry) = self.knowledge_base.lookup(question) {
            debug!(faq = %entry.question, "Answered from knowledge base");
            return Ok(vec![Message::from_agent(KNOWLEDGE_AGENT, entry.answer.clone())]);
        }

        let reply = self
            .model
            .complete(CompletionRequest::new(INSTRUCTIONS, messages.to_vec()))
            .await?;

        Ok(vec![Message::from_agent(
            KNOWLEDGE_AGENT,
            reply.content.unwrap_or_default(),
        )])
    }
}
