//! The named sub-agents the supervisor can route to

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::llm::ChatModel;
use crate::subagents::knowledge::KNOWLEDGE_AGENT;
use crate::subagents::{Agent, KnowledgeAgent, KnowledgeBase, ToolAgent};
use crate::tools::ToolRegistry;
use crate::Result;
use std::sync::Arc;

pub const TRANSACTIONS_AGENT: &str = "TransactionsAgent";
pub const PAYMENTS_AGENT: &str = "PaymentsAgent";
pub const OPERATIONS_AGENT: &str = "OperationsAgent";

const TRANSACTIONS_TOOLS: &[&str] = &[
    "get_account_balance_list",
    "get_payments_contracts_list",
    "get_transactions",
    "aggregate_transactions",
    "get_current_time",
    "convert_europe_amsterdam_to_unix",
    "get_manage_data_client",
    "customer_representatives",
];

const PAYMENTS_TOOLS: &[&str] = &[
    "get_account_balance_list",
    "get_payments_contracts_list",
    "fetch_address_book",
    "fetch_payment_models_query",
    "fetch_account_number_formats",
    "fetch_single_sepa_payment_instruction",
    "fetch_payment_instruction_type_options",
    "fetch_account_holder_validation",
    "get_manage_data_client",
    "customer_representatives",
];

const OPERATIONS_TOOLS: &[&str] = &[
    "get_manage_data_client",
    "validate_new_phone_number",
    "change_phone_number",
    "customer_representatives",
    "get_messages",
    "delete_message",
    "get_detailed_message",
    "get_tasks",
    "delete_task",
    "get_newsletter_settings",
];

const TRANSACTIONS_INSTRUCTIONS: &str = "You are a transaction banking assistant at a Dutch bank.
- Use get_current_time for anything involving today's date; never rely on your own clock.
- Most customers call their main account 'Personal Account'.
- The end date of a range is exclusive and can never be later than today. Ask the user when the range is unclear.
- For totals over a date range call aggregate_transactions; it fetches every page for you.
- When listing with get_transactions, keep passing lastMutationKey as last_mutation_key until it is null.
- Answer with the total and the exact date range covered.";

const PAYMENTS_INSTRUCTIONS: &str = "You are a payments assistant at a Dutch bank.
- If the source or recipient account is missing, confirm whether to use the primary account and look the recipient up in the address book; ask the user when the lookup fails.
- Validate the recipient's account holder before creating a payment.
- Verify that the source account has sufficient funds.
- After the payment instruction is created, tell the user to approve it in their banking app.";

const OPERATIONS_INSTRUCTIONS: &str = "You are a general banking operations assistant.
Use the tools to view or update customer data and phone numbers, handle representatives, \
manage tasks and approval requests, read or delete messages and read newsletter preferences.";

pub fn transactions_agent(model: Arc<dyn ChatModel>, registry: &ToolRegistry) -> ToolAgent {
    ToolAgent::new(
        TRANSACTIONS_AGENT,
        "Retrieves account balances and contract lists, lists payment contracts, and fetches, \
         filters and totals transactions or spending by type, date and amount.",
        TRANSACTIONS_INSTRUCTIONS,
        model,
        registry.subset(TRANSACTIONS_TOOLS),
    )
}

pub fn payments_agent(model: Arc<dyn ChatModel>, registry: &ToolRegistry) -> ToolAgent {
    ToolAgent::new(
        PAYMENTS_AGENT,
        "Executes payments, reads the address book and payment models, validates account \
         holders and payment instructions, and returns account number formats.",
        PAYMENTS_INSTRUCTIONS,
        model,
        registry.subset(PAYMENTS_TOOLS),
    )
}

pub fn operations_agent(model: Arc<dyn ChatModel>, registry: &ToolRegistry) -> ToolAgent {
    ToolAgent::new(
        OPERATIONS_AGENT,
        "Views and edits customer data (name, email, phone, address, date of birth), handles \
         representatives, manages tasks and approval requests, reads and deletes messages, \
         and reads newsletter preferences.",
        OPERATIONS_INSTRUCTIONS,
        model,
        registry.subset(OPERATIONS_TOOLS),
    )
}

/// Ordered, name-addressable set of sub-agents with a default for misroutes
#[derive(Clone)]
pub struct AgentRoster {
    agents: Vec<Arc<dyn Agent>>,
    default_agent: String,
}

impl AgentRoster {
    pub fn new(agents: Vec<Arc<dyn Agent>>, default_agent: &str) -> Result<Self> {
        if !agents.iter().any(|agent| agent.name() == default_agent) {
            return Err(OrchestrationError::AgentNotFound(format!(
                "default agent {} is not in the roster",
                default_agent
            )));
        }

        Ok(Self {
            agents,
            default_agent: default_agent.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .find(|agent| agent.name() == name)
            .cloned()
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|agent| agent.name()).collect()
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    /// "- Name: description" lines for routing instructions
    pub fn capabilities(&self) -> String {
        self.agents
            .iter()
            .map(|agent| format!("- {}: {}", agent.name(), agent.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The four production sub-agents; the knowledge path is the default
pub fn build_roster(
    model: Arc<dyn ChatModel>,
    registry: &ToolRegistry,
    settings: &Settings,
) -> Result<AgentRoster> {
    let rounds = settings.agent_max_tool_rounds;

    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(transactions_agent(model.clone(), registry).with_max_tool_rounds(rounds)),
        Arc::new(payments_agent(model.clone(), registry).with_max_tool_rounds(rounds)),
        Arc::new(operations_agent(model.clone(), registry).with_max_tool_rounds(rounds)),
        Arc::new(KnowledgeAgent::new(KnowledgeBase::builtin(), model)),
    ];

    AgentRoster::new(agents, KNOWLEDGE_AGENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::tools::{create_default_registry, BankApiClient};
    use std::time::Duration;

    fn registry() -> ToolRegistry {
        let bank = Arc::new(
            BankApiClient::new("http://127.0.0.1:1", Duration::from_secs(1), None).unwrap(),
        );
        create_default_registry(&bank, 5)
    }

    #[test]
    fn test_every_subset_tool_is_registered() {
        let registry = registry();
        for name in TRANSACTIONS_TOOLS
            .iter()
            .chain(PAYMENTS_TOOLS)
            .chain(OPERATIONS_TOOLS)
        {
            assert!(registry.get(name).is_some(), "{} is not registered", name);
        }

        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::default());
        let payments = payments_agent(model, &registry);
        assert_eq!(payments.tools().len(), PAYMENTS_TOOLS.len());
        assert!(payments.tools().get("get_transactions").is_none());
    }

    #[test]
    fn test_roster_order_and_default() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::default());
        let roster = build_roster(model, &registry(), &Settings::default()).unwrap();

        assert_eq!(
            roster.names(),
            vec![TRANSACTIONS_AGENT, PAYMENTS_AGENT, OPERATIONS_AGENT, KNOWLEDGE_AGENT]
        );
        assert_eq!(roster.default_agent(), KNOWLEDGE_AGENT);
        assert!(roster.capabilities().contains("- PaymentsAgent: Executes payments"));
    }

    #[test]
    fn test_roster_requires_known_default() {
        let result = AgentRoster::new(Vec::new(), "Nobody");
        assert!(matches!(result, Err(OrchestrationError::AgentNotFound(_))));
    }
}
