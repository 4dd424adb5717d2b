//! Core types for rail fragments and selections.
//!
//! A rail fragment is the unit of guardrail configuration: a partial policy
//! tree, a list of flow-script blocks and an optional custom-action binding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a custom action implementation.
///
/// The composed configuration only carries references; the session resolves
/// them against its action catalog when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(pub String);

impl ActionRef {
    /// Create a new action reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binds an action name used in flow scripts to its implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBinding {
    /// Name used by `execute <name>(...)` in flow scripts
    pub name: String,
    /// Implementation reference resolved by the session
    pub implementation: ActionRef,
}

impl ActionBinding {
    /// Create a new binding.
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: ActionRef::new(implementation),
        }
    }
}

/// A self-contained guardrail: policy, flows and optional action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailFragment {
    /// Unique identifier
    pub id: String,
    /// Human-readable name for menus
    pub label: String,
    /// Partial policy tree merged into the base configuration
    #[serde(default = "empty_policy")]
    pub policy: Value,
    /// Flow-script blocks, appended in order
    #[serde(default)]
    pub flows: Vec<String>,
    /// Optional custom action binding
    #[serde(default)]
    pub action: Option<ActionBinding>,
}

fn empty_policy() -> Value {
    Value::Object(serde_json::Map::new())
}

impl RailFragment {
    /// Create a fragment with an empty policy and no flows.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            policy: empty_policy(),
            flows: Vec::new(),
            action: None,
        }
    }

    /// Builder: set the policy fragment.
    pub fn with_policy(mut self, policy: Value) -> Self {
        self.policy = policy;
        self
    }

    /// Builder: append a flow-script block.
    ///
    /// Blocks are normalized (common indentation and surrounding blank lines
    /// removed) so that identical flows compare equal regardless of how they
    /// were embedded in source.
    pub fn with_flow(mut self, flow: impl AsRef<str>) -> Self {
        self.flows.push(crate::flow::normalize_block(flow.as_ref()));
        self
    }

    /// Builder: bind a custom action.
    pub fn with_action(mut self, name: impl Into<String>, implementation: impl Into<String>) -> Self {
        self.action = Some(ActionBinding::new(name, implementation));
        self
    }
}

/// Ordered, duplicate-free set of rail identifiers chosen for a session.
///
/// Deserialization goes through [`SelectionSet::new`], so duplicates in
/// stored selections are dropped too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectionIds")]
pub struct SelectionSet {
    pub(crate) ids: Vec<String>,
}

#[derive(Deserialize)]
struct SelectionIds {
    ids: Vec<String>,
}

impl From<SelectionIds> for SelectionSet {
    fn from(raw: SelectionIds) -> Self {
        Self::new(raw.ids)
    }
}

impl SelectionSet {
    /// Build a selection, keeping the first occurrence of each id.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selection = Self::default();
        for id in ids {
            selection.push(id);
        }
        selection
    }

    /// Add an id unless already selected. Returns whether it was added.
    pub fn push(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Parse operator input against a registry.
    ///
    /// Accepts whitespace- or comma-separated rail ids or 1-based menu
    /// positions as shown by [`crate::RailRegistry::list_available`].
    pub fn parse(
        input: &str,
        registry: &crate::RailRegistry,
    ) -> Result<Self, crate::RegistryError> {
        let mut selection = Self::default();
        for token in input
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            let id = registry.resolve_choice(token)?;
            selection.push(id);
        }
        Ok(selection)
    }

    /// Selected ids in selection order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of selected ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether an id is selected.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// The base policy document every composition starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseConfiguration(Value);

impl BaseConfiguration {
    /// Wrap a policy tree. Non-object roots are rejected.
    pub fn new(policy: Value) -> Result<Self, serde_yaml::Error> {
        if policy.is_object() {
            Ok(Self(policy))
        } else {
            Err(serde::de::Error::custom(
                "base configuration must be a mapping at the top level",
            ))
        }
    }

    /// An empty base configuration.
    pub fn empty() -> Self {
        Self(empty_policy())
    }

    /// Load from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let value: Value = serde_yaml::from_str(yaml)?;
        match value {
            // An empty document parses as null.
            Value::Null => Ok(Self::empty()),
            other => Self::new(other),
        }
    }

    /// The policy tree.
    pub fn policy(&self) -> &Value {
        &self.0
    }
}

impl Default for BaseConfiguration {
    fn default() -> Self {
        Self::empty()
    }
}
