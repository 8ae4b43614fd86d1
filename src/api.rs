//! REST API server
//!
//! Exposes the supervisor chat and the approval-gated plan runs over HTTP.
//! The incoming `cookie` header is forwarded to the bank tools.

use axum::{
    extract::{Path, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::models::{ApprovalDecision, RequestContext};
use crate::services::Services;
use crate::supervisor::ChatService;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub session_id: Option<String>,
    pub goal: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

fn reply<T: Serialize>(result: crate::Result<T>) -> ApiReply {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(error = %e, "Request failed");
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

fn status_for(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::InvalidRunState(_) => StatusCode::CONFLICT,
        OrchestrationError::InvalidPlan(_)
        | OrchestrationError::PlanningError(_)
        | OrchestrationError::RoutingError(_)
        | OrchestrationError::InvalidToolInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub chat: Arc<ChatService>,
    pub orchestrator: Arc<Orchestrator>,
}

impl From<&Services> for ApiState {
    fn from(services: &Services) -> Self {
        Self {
            chat: services.chat.clone(),
            orchestrator: services.orchestrator.clone(),
        }
    }
}

/// =============================
/// Helpers
/// =============================

/// Deterministic id for non-UUID session keys
fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

fn session_id(value: Option<&str>) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => Uuid::new_v4(),
    }
}

fn request_context(headers: &HeaderMap, session: Option<&str>) -> RequestContext {
    let cookie = headers
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);

    RequestContext::new(session_id(session), cookie)
}

fn parse_token(raw: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| OrchestrationError::ApprovalNotFound(raw.to_string()))
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> ApiReply {
    let ctx = request_context(&headers, req.session_id.as_deref());
    info!(session_id = %ctx.session_id, "Chat turn received");

    reply(state.chat.chat(&req.message, &ctx).await)
}

async fn create_plan(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PlanRequest>,
) -> ApiReply {
    let ctx = request_context(&headers, req.session_id.as_deref());
    info!(session_id = %ctx.session_id, goal = %req.goal, "Plan requested");

    reply(state.orchestrator.start(&req.goal, &ctx).await)
}

async fn get_plan(State(state): State<ApiState>, Path(token): Path<String>) -> ApiReply {
    let result = match parse_token(&token) {
        Ok(token) => state.orchestrator.status(token).await,
        Err(e) => Err(e),
    };
    reply(result)
}

async fn decide_plan(
    State(state): State<ApiState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(decision): Json<ApprovalDecision>,
) -> ApiReply {
    let token = match parse_token(&token) {
        Ok(token) => token,
        Err(e) => return reply::<()>(Err(e)),
    };

    // Runs stay bound to the session that created them
    let session = match state.orchestrator.session_of(token).await {
        Ok(session) => session.to_string(),
        Err(e) => return reply::<()>(Err(e)),
    };
    let ctx = request_context(&headers, Some(&session));

    info!(%token, ?decision, "Approval decision received");
    reply(state.orchestrator.resume(token, decision, &ctx).await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/plans", post(create_plan))
        .route("/api/plans/:token", get(get_plan))
        .route("/api/plans/:token/decision", post(decide_plan))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordRouter;
    use crate::config::Settings;
    use crate::llm::{ModelReply, ScriptedModel};
    use crate::services::build_stores;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(replies: Vec<ModelReply>) -> Router {
        router_with(
            Settings {
                bank_base_url: "http://127.0.0.1:1".to_string(),
                ..Settings::default()
            },
            replies,
        )
    }

    fn router_with(settings: Settings, replies: Vec<ModelReply>) -> Router {
        let (checkpoints, conversations) = build_stores(&settings).unwrap();
        let services = Services::assemble(
            &settings,
            Arc::new(ScriptedModel::new(replies)),
            Arc::new(KeywordRouter::banking()),
            checkpoints,
            conversations,
        )
        .unwrap();
        create_router(ApiState::from(&services))
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&router(vec![]), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_routes_to_knowledge_agent() {
        let router = router(vec![]);
        let (status, body) = call(
            &router,
            "POST",
            "/api/chat",
            Some(json!({"session_id": "web-42", "message": "I lost my card, how do I block it?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["agent"], "KnowledgeAgent");
        assert!(body["data"]["reply"].as_str().unwrap().contains("Block card"));
        assert_eq!(
            body["data"]["session_id"],
            stable_uuid_from_string("web-42").to_string()
        );
    }

    #[tokio::test]
    async fn test_plan_approval_flow_over_http() {
        let router = router(vec![ModelReply::text(
            r#"{"steps": ["Confirm source account", "Execute payment"]}"#,
        )]);

        let (status, body) = call(
            &router,
            "POST",
            "/api/plans",
            Some(json!({"goal": "pay 50 EUR to John"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "awaiting_approval");
        assert_eq!(
            body["data"]["approval"]["plan"],
            "1. Confirm source account\n2. Execute payment"
        );
        let token = body["data"]["resume_token"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/plans/{}/decision", token),
            Some(json!({"type": "declined"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "declined");
        assert_eq!(body["data"]["past_steps"], json!([]));

        let (status, body) = call(&router, "GET", &format!("/api/plans/{}", token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "declined");

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/plans/{}/decision", token),
            Some(json!({"type": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_decision_on_expired_plan_reports_expiry() {
        let settings = Settings {
            bank_base_url: "http://127.0.0.1:1".to_string(),
            approval_ttl: std::time::Duration::ZERO,
            ..Settings::default()
        };
        let router = router_with(
            settings,
            vec![ModelReply::text(r#"{"steps": ["Execute payment"]}"#)],
        );

        let (status, body) = call(
            &router,
            "POST",
            "/api/plans",
            Some(json!({"goal": "pay 50 EUR to John"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["resume_token"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/plans/{}/decision", token),
            Some(json!({"type": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "expired");
        assert_eq!(body["data"]["past_steps"], json!([]));
    }

    #[tokio::test]
    async fn test_failed_chat_turn_is_still_answered() {
        // Routing fails on an exhausted model
        let settings = Settings {
            bank_base_url: "http://127.0.0.1:1".to_string(),
            ..Settings::default()
        };
        let (checkpoints, conversations) = build_stores(&settings).unwrap();
        let model = Arc::new(ScriptedModel::default());
        let services = Services::assemble(
            &settings,
            model.clone(),
            Arc::new(crate::supervisor::ModelRouter::new(model)),
            checkpoints,
            conversations,
        )
        .unwrap();
        let router = create_router(ApiState::from(&services));

        let (status, body) = call(
            &router,
            "POST",
            "/api/chat",
            Some(json!({"session_id": "web-7", "message": "What are your opening hours?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["agent"], Value::Null);
        assert!(body["data"]["reply"]
            .as_str()
            .unwrap()
            .starts_with("Sorry, I could not complete that request:"));
    }

    #[tokio::test]
    async fn test_empty_chat_message_is_rejected() {
        let router = router(vec![]);
        let (status, _) = call(&router, "POST", "/api/chat", Some(json!({"message": "  "}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let router = router(vec![]);
        let (status, _) = call(&router, "GET", "/api/plans/not-a-token", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &router,
            "GET",
            &format!("/api/plans/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_goal_is_rejected() {
        let router = router(vec![]);
        let (status, body) = call(&router, "POST", "/api/plans", Some(json!({"goal": " "}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("goal"));
    }
}
