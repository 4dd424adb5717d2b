//! Chain-of-Verification fact-checking rail.
//!
//! Runs as an output rail: the flow produces a baseline answer and hands it to
//! the `self_check_facts` action, which is bound to the CoVe pipeline.

use serde_json::json;

use crate::library::RailProvider;
use crate::types::RailFragment;

/// Action name used by the fact-checking flow.
pub const SELF_CHECK_FACTS: &str = "self_check_facts";

/// Implementation reference the session resolves to the CoVe pipeline.
pub const COVE_ACTION_REF: &str = "cove.self_check_facts";

/// Default cap on verification questions per answer.
pub const DEFAULT_MAX_QUESTIONS: u64 = 8;

/// Provider for the CoVe rail.
pub struct CoveRail;

impl RailProvider for CoveRail {
    fn id(&self) -> &'static str {
        "cove"
    }

    fn fragment(&self) -> RailFragment {
        RailFragment::new(self.id(), "Chain-of-Verification (Custom Fact-Checking)")
            .with_policy(json!({
                "rails": {"output": {"flows": ["self check facts"]}},
                "cove": {"max_questions": DEFAULT_MAX_QUESTIONS},
            }))
            .with_flow(
                r#"
                define user ask question
                  "What is the capital of Australia?"
                  "Who wrote '1984'?"
                "#,
            )
            .with_flow(
                r#"
                define flow self check facts
                  user ask question
                  $fact_check_result = execute self_check_facts(user_message=$last_user_message)
                  bot $fact_check_result
                "#,
            )
            .with_action(SELF_CHECK_FACTS, COVE_ACTION_REF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::referenced_actions;

    #[test]
    fn test_cove_rail_binds_its_action() {
        let fragment = CoveRail.fragment();
        let binding = fragment.action.as_ref().unwrap();
        assert_eq!(binding.name, SELF_CHECK_FACTS);
        assert_eq!(binding.implementation.as_str(), COVE_ACTION_REF);

        let referenced: Vec<_> = fragment.flows.iter().flat_map(|f| referenced_actions(f)).collect();
        assert!(referenced.iter().any(|a| a == SELF_CHECK_FACTS));
    }
}
