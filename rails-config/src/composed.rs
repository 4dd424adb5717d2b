//! The composed configuration handed to the rails runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::ActionRef;

/// A rail that contributed to a composed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRail {
    /// Fragment id
    pub id: String,
    /// Human-readable name
    pub label: String,
}

/// One merged, validated configuration for a session.
///
/// Built only by [`crate::ConfigComposer`]. Everything is kept in ordered
/// containers so the canonical serialization is reproducible. Serialize-only:
/// the fingerprint is never taken from outside input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedConfiguration {
    /// Rails in selection order
    pub(crate) rails: Vec<ActiveRail>,
    /// Merged policy tree
    pub(crate) policy: Value,
    /// Flow blocks in append order, duplicate-free
    pub(crate) flows: Vec<String>,
    /// Action name to implementation reference
    pub(crate) actions: BTreeMap<String, ActionRef>,
    /// SHA-256 over the fields above
    pub(crate) fingerprint: String,
}

impl ComposedConfiguration {
    pub(crate) fn new(
        rails: Vec<ActiveRail>,
        policy: Value,
        flows: Vec<String>,
        actions: BTreeMap<String, ActionRef>,
    ) -> Self {
        let fingerprint = compute_fingerprint(&rails, &policy, &flows, &actions);
        Self {
            rails,
            policy,
            flows,
            actions,
            fingerprint,
        }
    }

    /// Rails that were composed, in selection order.
    pub fn rails(&self) -> &[ActiveRail] {
        &self.rails
    }

    /// Whether a rail is active.
    pub fn has_rail(&self, id: &str) -> bool {
        self.rails.iter().any(|r| r.id == id)
    }

    /// The merged policy tree.
    pub fn policy(&self) -> &Value {
        &self.policy
    }

    /// A section of the policy tree by dotted path (`rails.input.flows`).
    pub fn policy_section(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.policy, |node, key| node.get(key))
    }

    /// Flow blocks in append order.
    pub fn flows(&self) -> &[String] {
        &self.flows
    }

    /// Action bindings, sorted by action name.
    pub fn actions(&self) -> &BTreeMap<String, ActionRef> {
        &self.actions
    }

    /// Audit fingerprint of this configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// All flow blocks as one script, the form the runtime ingests.
    pub fn flow_script(&self) -> String {
        let mut script = self.flows.join("\n\n");
        if !script.is_empty() {
            script.push('\n');
        }
        script
    }

    /// The policy tree as a YAML document, the form the runtime ingests.
    pub fn policy_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.policy)
    }

    /// Canonical bytes of the whole configuration.
    ///
    /// Identical compositions always produce identical bytes.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn compute_fingerprint(
    rails: &[ActiveRail],
    policy: &Value,
    flows: &[String],
    actions: &BTreeMap<String, ActionRef>,
) -> String {
    let mut hasher = Sha256::new();

    for rail in rails {
        hasher.update(rail.id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([0xffu8]);

    // Map order is fixed for a given composition, so this rendering is stable.
    hasher.update(policy.to_string().as_bytes());
    hasher.update([0xffu8]);

    for flow in flows {
        hasher.update(flow.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([0xffu8]);

    for (name, implementation) in actions {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(implementation.as_str().as_bytes());
        hasher.update([0u8]);
    }

    hex::encode(hasher.finalize())
}
