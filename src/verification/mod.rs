//! Plan verification
//!
//! Rules-based checks applied to every plan before it is shown for approval
//! and to every revised plan before execution continues.

use crate::error::OrchestrationError;
use crate::models::{PastStep, Plan};
use crate::Result;
use std::collections::HashSet;
use tracing::{info, warn};

/// Trait for plan rules
pub trait PlanRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the rule also applies to revised plans
    fn applies_to_replans(&self) -> bool {
        true
    }

    fn check(&self, plan: &Plan) -> RuleResult;
}

pub struct RuleResult {
    pub passed: bool,
    pub details: String,
}

impl RuleResult {
    fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
        }
    }

    fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

/// Initial plans must have work in them; an empty revision means "done"
pub struct NonEmptyPlanRule;

impl PlanRule for NonEmptyPlanRule {
    fn name(&self) -> &'static str {
        "non_empty_plan"
    }

    fn applies_to_replans(&self) -> bool {
        false
    }

    fn check(&self, plan: &Plan) -> RuleResult {
        if plan.is_empty() {
            RuleResult::fail("Plan has no steps")
        } else {
            RuleResult::pass(format!("{} step(s)", plan.len()))
        }
    }
}

pub struct MaxStepsRule {
    pub max_steps: usize,
}

impl PlanRule for MaxStepsRule {
    fn name(&self) -> &'static str {
        "max_steps"
    }

    fn check(&self, plan: &Plan) -> RuleResult {
        if plan.len() > self.max_steps {
            RuleResult::fail(format!(
                "Plan has {} steps, limit is {}",
                plan.len(),
                self.max_steps
            ))
        } else {
            RuleResult::pass("Within step limit")
        }
    }
}

pub struct NoDuplicateStepsRule;

impl PlanRule for NoDuplicateStepsRule {
    fn name(&self) -> &'static str {
        "no_duplicate_steps"
    }

    fn check(&self, plan: &Plan) -> RuleResult {
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = plan
            .steps
            .iter()
            .filter(|step| !seen.insert(normalize(step)))
            .map(|step| step.as_str())
            .collect();

        if duplicates.is_empty() {
            RuleResult::pass("No repeated steps")
        } else {
            RuleResult::fail(format!("Repeated steps: {:?}", duplicates))
        }
    }
}

/// Verifier that enforces rules
pub struct PlanVerifier {
    rules: Vec<Box<dyn PlanRule>>,
}

impl PlanVerifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn PlanRule>) {
        self.rules.push(rule);
    }

    pub fn verify_initial(&self, plan: &Plan) -> Result<()> {
        self.run(plan, false)
    }

    pub fn verify_replan(&self, plan: &Plan) -> Result<()> {
        self.run(plan, true)
    }

    fn run(&self, plan: &Plan, replan: bool) -> Result<()> {
        let issues: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| !replan || rule.applies_to_replans())
            .filter_map(|rule| {
                let result = rule.check(plan);
                (!result.passed).then(|| format!("{}: {}", rule.name(), result.details))
            })
            .collect();

        info!(
            rule_count = self.rules.len(),
            replan,
            verified = issues.is_empty(),
            "Plan verification completed"
        );

        if issues.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidPlan(issues.join("; ")))
        }
    }
}

impl Default for PlanVerifier {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_default_verifier(max_steps: usize) -> PlanVerifier {
    let mut verifier = PlanVerifier::new();
    verifier.add_rule(Box::new(NonEmptyPlanRule));
    verifier.add_rule(Box::new(MaxStepsRule { max_steps }));
    verifier.add_rule(Box::new(NoDuplicateStepsRule));
    verifier
}

/// Drops revised steps that repeat an already executed step
pub fn drop_completed_steps(plan: Plan, past_steps: &[PastStep]) -> Plan {
    let done: HashSet<String> = past_steps.iter().map(|p| normalize(&p.step)).collect();

    let before = plan.len();
    let steps: Vec<String> = plan
        .steps
        .into_iter()
        .filter(|step| !done.contains(&normalize(step)))
        .collect();

    if steps.len() < before {
        warn!(
            dropped = before - steps.len(),
            "Revised plan repeated completed steps"
        );
    }

    Plan::new(steps)
}

fn normalize(step: &str) -> String {
    step.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(steps: &[&str]) -> Plan {
        Plan::new(steps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_default_rules() {
        let verifier = create_default_verifier(3);

        assert!(verifier.verify_initial(&plan(&["a", "b"])).is_ok());
        assert!(verifier.verify_initial(&plan(&[])).is_err());
        assert!(verifier.verify_replan(&plan(&[])).is_ok());

        let err = verifier
            .verify_initial(&plan(&["a", "b", "c", "d"]))
            .unwrap_err();
        assert!(err.to_string().contains("max_steps"));

        let err = verifier
            .verify_replan(&plan(&["Check balance", "check  balance."]))
            .unwrap_err();
        assert!(err.to_string().contains("no_duplicate_steps"));
    }

    #[test]
    fn test_completed_steps_never_come_back() {
        let past = vec![PastStep {
            step: "Confirm the source account".to_string(),
            result: "NL01".to_string(),
        }];

        let revised = drop_completed_steps(
            plan(&["confirm the source account.", "Execute the payment"]),
            &past,
        );
        assert_eq!(revised.steps, vec!["Execute the payment"]);
    }
}
