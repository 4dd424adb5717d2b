//! Configuration Composer.
//!
//! Folds the selected rail fragments over a base configuration. The fold is
//! a pure function of `(base, selection order)`: no clocks, no randomness,
//! ordered containers only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::composed::{ActiveRail, ComposedConfiguration};
use crate::flow::{flow_names, referenced_actions};
use crate::merge::{MergeError, MergeRuleTable};
use crate::registry::RailRegistry;
use crate::types::{ActionRef, BaseConfiguration, SelectionSet};

/// Actions every rails runtime provides without a binding.
pub const DEFAULT_RUNTIME_ACTIONS: &[&str] = &["llm", "self_check_input", "self_check_output"];

/// Error types for composition. All of them abort session creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// Selection references a rail that is not registered
    #[error("Unknown rail: {0}")]
    UnknownRail(String),

    /// Two rails bind different implementations to one action name
    #[error("Action '{name}' bound to both '{existing}' and '{incoming}'")]
    ActionConflict {
        name: String,
        existing: ActionRef,
        incoming: ActionRef,
    },

    /// A rail's policy cannot be merged
    #[error("Rail '{rail}' violates a merge invariant: {source}")]
    Merge {
        rail: String,
        #[source]
        source: MergeError,
    },

    /// A flow executes an action nobody provides
    #[error("Flow '{flow}' executes unbound action '{action}'")]
    UnresolvedAction { flow: String, action: String },
}

/// Composes rail fragments from a registry into runtime configurations.
#[derive(Debug, Clone)]
pub struct ConfigComposer {
    registry: Arc<RailRegistry>,
    rules: MergeRuleTable,
    runtime_actions: BTreeSet<String>,
}

impl ConfigComposer {
    /// Create a composer with the default rule table and runtime actions.
    pub fn new(registry: Arc<RailRegistry>) -> Self {
        Self {
            registry,
            rules: MergeRuleTable::default(),
            runtime_actions: DEFAULT_RUNTIME_ACTIONS.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Builder: replace the merge rule table.
    pub fn with_rules(mut self, rules: MergeRuleTable) -> Self {
        self.rules = rules;
        self
    }

    /// Builder: replace the set of actions the runtime provides itself.
    pub fn with_runtime_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// The registry fragments are looked up in.
    pub fn registry(&self) -> &RailRegistry {
        &self.registry
    }

    /// Merge the selected fragments over `base`.
    ///
    /// Policies deep-merge in selection order (later scalars win), flow
    /// blocks append unless already present, action bindings union. The
    /// result has no duplicate flow blocks and no unbound action references.
    pub fn compose(
        &self,
        base: &BaseConfiguration,
        selection: &SelectionSet,
    ) -> Result<ComposedConfiguration, ComposeError> {
        let mut policy = base.policy().clone();
        let mut flows: Vec<String> = Vec::new();
        let mut actions: BTreeMap<String, ActionRef> = BTreeMap::new();
        let mut rails = Vec::with_capacity(selection.len());
        let mut folded: BTreeSet<&str> = BTreeSet::new();

        for id in selection.ids() {
            if !folded.insert(id.as_str()) {
                debug!(rail = %id, "Skipping rail already folded");
                continue;
            }

            let fragment = self
                .registry
                .lookup(id)
                .map_err(|_| ComposeError::UnknownRail(id.clone()))?;

            self.rules
                .merge(&mut policy, &fragment.policy)
                .map_err(|source| ComposeError::Merge {
                    rail: id.clone(),
                    source,
                })?;

            for flow in &fragment.flows {
                if flows.contains(flow) {
                    debug!(rail = %id, "Skipping flow block already present");
                    continue;
                }
                flows.push(flow.clone());
            }

            if let Some(binding) = &fragment.action {
                match actions.get(&binding.name) {
                    Some(existing) if *existing != binding.implementation => {
                        return Err(ComposeError::ActionConflict {
                            name: binding.name.clone(),
                            existing: existing.clone(),
                            incoming: binding.implementation.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        actions.insert(binding.name.clone(), binding.implementation.clone());
                    }
                }
            }

            rails.push(ActiveRail {
                id: fragment.id.clone(),
                label: fragment.label.clone(),
            });
        }

        self.check_actions_resolved(&flows, &actions)?;

        let composed = ComposedConfiguration::new(rails, policy, flows, actions);

        info!(
            rails = composed.rails().len(),
            flows = composed.flows().len(),
            fingerprint = %composed.fingerprint(),
            "Composed rails configuration"
        );

        Ok(composed)
    }

    fn check_actions_resolved(
        &self,
        flows: &[String],
        actions: &BTreeMap<String, ActionRef>,
    ) -> Result<(), ComposeError> {
        for flow in flows {
            for action in referenced_actions(flow) {
                if actions.contains_key(&action) || self.runtime_actions.contains(&action) {
                    continue;
                }
                let flow = flow_names(flow)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "<anonymous>".to_string());
                return Err(ComposeError::UnresolvedAction { flow, action });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RailFragment;
    use serde_json::json;

    fn composer_with(fragments: Vec<RailFragment>) -> ConfigComposer {
        let mut builder = RailRegistry::builder();
        for fragment in fragments {
            builder = builder.register(fragment).unwrap();
        }
        ConfigComposer::new(Arc::new(builder.build()))
    }

    #[test]
    fn test_empty_selection_is_base() {
        let composer = ConfigComposer::new(Arc::new(RailRegistry::builtin()));
        let base = BaseConfiguration::new(json!({"colang_version": "2.x"})).unwrap();

        let composed = composer.compose(&base, &SelectionSet::default()).unwrap();

        assert_eq!(composed.policy(), base.policy());
        assert!(composed.flows().is_empty());
        assert!(composed.actions().is_empty());
    }

    #[test]
    fn test_shared_binding_is_not_a_conflict() {
        let a = RailFragment::new("a", "A").with_action("fact_check", "cove.self_check_facts");
        let b = RailFragment::new("b", "B").with_action("fact_check", "cove.self_check_facts");
        let composer = composer_with(vec![a, b]);

        let composed = composer
            .compose(&BaseConfiguration::empty(), &SelectionSet::new(["a", "b"]))
            .unwrap();

        assert_eq!(composed.actions().len(), 1);
    }

    #[test]
    fn test_repeated_id_folds_once() {
        let composer = ConfigComposer::new(Arc::new(RailRegistry::builtin()));
        let base = BaseConfiguration::new(json!({"colang_version": "2.x"})).unwrap();
        let repeated = SelectionSet {
            ids: vec!["cove".to_string(), "cove".to_string()],
        };

        let once = composer.compose(&base, &SelectionSet::new(["cove"])).unwrap();
        let twice = composer.compose(&base, &repeated).unwrap();

        assert_eq!(twice.rails().len(), 1);
        assert_eq!(once.fingerprint(), twice.fingerprint());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_error_names_rail() {
        let a = RailFragment::new("a", "A").with_policy(json!({"rails": {"input": {}}}));
        let b = RailFragment::new("b", "B").with_policy(json!({"rails": ["oops"]}));
        let composer = composer_with(vec![a, b]);

        let err = composer
            .compose(&BaseConfiguration::empty(), &SelectionSet::new(["a", "b"]))
            .unwrap_err();

        assert!(matches!(err, ComposeError::Merge { ref rail, .. } if rail == "b"));
    }

    #[test]
    fn test_runtime_actions_can_be_narrowed() {
        let composer = ConfigComposer::new(Arc::new(RailRegistry::builtin()))
            .with_runtime_actions(["llm"]);

        let err = composer
            .compose(
                &BaseConfiguration::empty(),
                &SelectionSet::new(["jailbreak_detection"]),
            )
            .unwrap_err();

        assert_eq!(
            err,
            ComposeError::UnresolvedAction {
                flow: "check for jailbreak".to_string(),
                action: "self_check_input".to_string(),
            }
        );
    }
}
