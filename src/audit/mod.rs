//! Audit trail of finished plan-execute runs
//!
//! Every terminal run (completed, declined, failed) is recorded with a
//! digest over its goal, plan and step log so later tampering is detectable.

use crate::models::{Checkpoint, PastStep, Plan, RunRecord};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record the final state of a run
    pub async fn record_run(&self, checkpoint: &Checkpoint) -> Result<Uuid> {
        let record = RunRecord {
            audit_id: Uuid::new_v4(),
            run_id: checkpoint.run_id,
            session_id: checkpoint.session_id,
            goal: checkpoint.goal.clone(),
            original_plan: checkpoint.original_plan.clone(),
            past_steps: checkpoint.past_steps.clone(),
            status: checkpoint.status,
            response: checkpoint.response.clone(),
            failure_reason: checkpoint.failure_reason.clone(),
            digest: compute_run_digest(
                &checkpoint.goal,
                &checkpoint.original_plan,
                &checkpoint.past_steps,
            ),
            created_at: Utc::now(),
        };

        let audit_id = record.audit_id;
        let mut records = self.records.write().await;
        records.insert(audit_id, record);
        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&audit_id).cloned())
    }

    /// Records of one session, oldest first
    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<RunRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<RunRecord> = records
            .values()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| record.created_at);
        Ok(items)
    }

    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records.get(&audit_id).map_or(false, |record| {
            compute_run_digest(&record.goal, &record.original_plan, &record.past_steps)
                == record.digest
        }))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct DigestInput<'a> {
    goal: &'a str,
    original_plan: &'a Plan,
    past_steps: &'a [PastStep],
}

/// SHA-256 over the JSON form, streamed straight into the hasher
pub fn compute_run_digest(goal: &str, original_plan: &Plan, past_steps: &[PastStep]) -> String {
    let mut hasher = Sha256::new();
    let input = DigestInput {
        goal,
        original_plan,
        past_steps,
    };

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &input).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;

    fn finished_run(session_id: Uuid) -> Checkpoint {
        let plan = Plan::new(vec!["Sum July debits".to_string()]);
        let now = Utc::now();
        Checkpoint {
            run_id: Uuid::new_v4(),
            resume_token: Uuid::new_v4(),
            session_id,
            goal: "How much did I spend in July?".to_string(),
            original_plan: plan,
            plan: Plan::default(),
            past_steps: vec![PastStep {
                step: "Sum July debits".to_string(),
                result: "1,234.56 EUR".to_string(),
            }],
            status: RunStatus::Completed,
            approval: None,
            response: Some("You spent 1,234.56 EUR.".to_string()),
            replans_count: 1,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_record_and_verify() {
        let log = AuditLog::new();
        let session = Uuid::new_v4();
        let id = log.record_run(&finished_run(session)).await.unwrap();

        assert!(log.verify_integrity(id).await.unwrap());
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());
        assert_eq!(log.list_for_session(session).await.unwrap().len(), 1);
        assert!(log.list_for_session(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_step_log_fails_verification() {
        let log = AuditLog::new();
        let id = log.record_run(&finished_run(Uuid::new_v4())).await.unwrap();

        {
            let mut records = log.records.write().await;
            let record = records.get_mut(&id).unwrap();
            record.past_steps[0].result = "0.00 EUR".to_string();
        }

        assert!(!log.verify_integrity(id).await.unwrap());
    }

    #[test]
    fn test_digest_is_stable() {
        let plan = Plan::new(vec!["a".to_string()]);
        let first = compute_run_digest("goal", &plan, &[]);
        assert_eq!(first, compute_run_digest("goal", &plan, &[]));
        assert_eq!(first.len(), 64);
        assert_ne!(first, compute_run_digest("other goal", &plan, &[]));
    }
}
