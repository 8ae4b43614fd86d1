//! Error types for the banking agent orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Plan-Execute Errors
    // =============================

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Max replans exceeded: {0}")]
    MaxReplansExceeded(String),

    #[error("Approval not found: {0}")]
    ApprovalNotFound(String),

    #[error("Approval expired: {0}")]
    ApprovalExpired(String),

    #[error("Invalid run state: {0}")]
    InvalidRunState(String),

    // =============================
    // Routing & Agents
    // =============================

    #[error("Routing error: {0}")]
    RoutingError(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    // =============================
    // Tools
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Pagination did not terminate after {pages} page(s) (last token: {last_token:?})")]
    PaginationDidNotTerminate {
        pages: usize,
        last_token: Option<String>,
    },

    // =============================
    // Infrastructure
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("State persistence error: {0}")]
    StateError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}
