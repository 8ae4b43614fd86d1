use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use banking_agent_orchestrator::classifier::KeywordRouter;
use banking_agent_orchestrator::config::Settings;
use banking_agent_orchestrator::llm::{ModelReply, ScriptedModel};
use banking_agent_orchestrator::memory::{ConversationStore, InMemoryConversationStore};
use banking_agent_orchestrator::models::{RequestContext, Role};
use banking_agent_orchestrator::subagents::build_roster;
use banking_agent_orchestrator::supervisor::{ChatService, ModelRouter, Supervisor};
use banking_agent_orchestrator::tools::{create_default_registry, BankApiClient};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Two pages of July mutations; the second page ends the listing
async fn fake_bank(calls: Arc<AtomicUsize>) -> SocketAddr {
    let router = Router::new()
        .route(
            "/mutations/:account",
            get(
                |State(calls): State<Arc<AtomicUsize>>,
                 Path(_account): Path<String>,
                 Query(params): Query<HashMap<String, String>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let (amount, next) = match params.get("lastMutationKey") {
                        None => (-12.5, json!("abc")),
                        Some(_) => (-17.5, Value::Null),
                    };
                    Json(json!({
                        "mutationsList": {
                            "mutations": [{"mutation": {
                                "amount": amount,
                                "currencyIsoCode": "EUR",
                                "transactionDate": "2025-07-10"
                            }}],
                            "lastMutationKey": next
                        }
                    }))
                },
            ),
        )
        .with_state(calls);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn settings(addr: SocketAddr) -> Settings {
    Settings {
        bank_base_url: format!("http://{}", addr),
        tool_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

#[tokio::test]
async fn spending_question_is_delegated_and_aggregated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = fake_bank(calls.clone()).await;
    let settings = settings(addr);

    let model = Arc::new(ScriptedModel::new(vec![
        // supervisor
        ModelReply::call("transfer_to_TransactionsAgent", json!({})),
        // TransactionsAgent
        ModelReply::call(
            "aggregate_transactions",
            json!({
                "account_number": "NL01ABNA0123456789",
                "start_date": "2025-07-01",
                "end_date": "2025-08-01",
                "direction": "DEBIT"
            }),
        ),
        ModelReply::text("You spent 30.00 EUR in July."),
    ]));

    let bank = Arc::new(BankApiClient::from_settings(&settings).unwrap());
    let registry = create_default_registry(&bank, settings.pagination_max_pages);
    let roster = build_roster(model.clone(), &registry, &settings).unwrap();
    let supervisor = Arc::new(Supervisor::new(roster, Arc::new(ModelRouter::new(model.clone()))));
    let store = Arc::new(InMemoryConversationStore::new());
    let service = ChatService::new(supervisor, store.clone());
    let ctx = RequestContext::new(Uuid::new_v4(), Some("session=abc".to_string()));

    let reply = service
        .chat("How much did I spend in July 2025?", &ctx)
        .await
        .unwrap();

    assert_eq!(reply.agent.as_deref(), Some("TransactionsAgent"));
    assert_eq!(reply.reply, "You spent 30.00 EUR in July.");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // tool request, tool result, final answer; merged verbatim
    assert_eq!(reply.appended.len(), 3);
    let tool_result = &reply.appended[1];
    assert_eq!(tool_result.role, Role::Tool);
    let report: Value = serde_json::from_str(&tool_result.content).unwrap();
    assert_eq!(report["pages_fetched"], 2);
    assert_eq!(report["record_count"], 2);
    assert_eq!(report["total"], -30.0);

    let history = store.load(ctx.session_id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.messages()[0].content, "How much did I spend in July 2025?");
}

#[tokio::test]
async fn rule_based_router_keeps_sessions_apart() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = fake_bank(calls.clone()).await;
    let settings = settings(addr);

    let model = Arc::new(ScriptedModel::default());
    let bank = Arc::new(BankApiClient::from_settings(&settings).unwrap());
    let registry = create_default_registry(&bank, settings.pagination_max_pages);
    let roster = build_roster(model, &registry, &settings).unwrap();
    let supervisor = Arc::new(Supervisor::new(roster, Arc::new(KeywordRouter::banking())));
    let store = Arc::new(InMemoryConversationStore::new());
    let service = ChatService::new(supervisor, store.clone());

    let first = RequestContext::new(Uuid::new_v4(), None);
    let second = RequestContext::new(Uuid::new_v4(), None);

    let reply = service
        .chat("Where do I find my IBAN?", &first)
        .await
        .unwrap();
    assert_eq!(reply.agent.as_deref(), Some("KnowledgeAgent"));

    service
        .chat("How do I download a statement as pdf?", &second)
        .await
        .unwrap();

    assert_eq!(store.load(first.session_id).await.unwrap().len(), 2);
    assert_eq!(store.load(second.session_id).await.unwrap().len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
