//! Banking Agent Orchestrator
//!
//! A multi-agent banking assistant that:
//! - Routes each conversation turn to one specialised sub-agent
//! - Lets sub-agents call bank REST endpoints through a uniform tool surface
//! - Runs multi-step goals as plans gated by human approval
//! - Persists suspended runs so a decision can resume them in any process
//! - Aggregates paginated transaction data with a bounded page count
//!
//! PLAN-EXECUTE LOOP:
//! PLAN → APPROVE → EXECUTE → REPLAN → (EXECUTE | DONE)

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod memory;
pub mod models;
pub mod planner;
pub mod services;
pub mod state;
pub mod subagents;
pub mod supervisor;
pub mod tools;
pub mod transactions;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{Orchestrator, RunSnapshot};
pub use supervisor::{ChatService, Supervisor};
