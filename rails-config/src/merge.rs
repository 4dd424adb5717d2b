//! Deep merge of policy fragments driven by an explicit rule table.
//!
//! Without a pinned rule the shape of the values decides:
//!
//! - object into object merges key by key
//! - list into list concatenates and drops values already present
//! - scalar into scalar overwrites (the later fragment wins)
//!
//! Mixing shapes (an object where a list was, a scalar over an object) is a
//! merge-invariant violation and never silently resolved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a policy key combines when more than one source sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Later value replaces earlier value
    Overwrite,
    /// Lists concatenate, values already present are dropped
    ConcatDedupe,
    /// Differing values are an authoring error
    RejectOnConflict,
}

/// Merge-invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Two sources set a reject-on-conflict key to different values
    #[error("Conflicting values for policy key '{path}'")]
    Conflict { path: String },

    /// Values of incompatible shape at the same key
    #[error("Cannot merge {incoming} into {existing} at policy key '{path}'")]
    ShapeMismatch {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },

    /// Fragment policy is not a mapping
    #[error("Policy fragment must be a mapping, got {0}")]
    NotAMapping(&'static str),
}

/// Per-key merge rules, addressed by dotted key path (e.g. `rails.input.flows`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeRuleTable {
    rules: BTreeMap<String, MergeRule>,
}

impl MergeRuleTable {
    /// A table with no pinned rules; value shapes decide everything.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Builder: pin a rule for a key path.
    pub fn with_rule(mut self, path: impl Into<String>, rule: MergeRule) -> Self {
        self.rules.insert(path.into(), rule);
        self
    }

    /// Load pinned rules from a YAML mapping of `path: rule`.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// The rule pinned for a path, if any.
    pub fn rule_for(&self, path: &str) -> Option<MergeRule> {
        self.rules.get(path).copied()
    }

    /// Merge `fragment` into `acc`.
    ///
    /// Both must be mappings at the top level. On error `acc` may hold a
    /// partial merge; callers discard it.
    pub fn merge(&self, acc: &mut Value, fragment: &Value) -> Result<(), MergeError> {
        let incoming = fragment
            .as_object()
            .ok_or_else(|| MergeError::NotAMapping(kind(fragment)))?;
        let acc_kind = kind(acc);
        let existing = acc
            .as_object_mut()
            .ok_or(MergeError::NotAMapping(acc_kind))?;

        self.merge_maps(existing, incoming, "")
    }

    fn merge_maps(
        &self,
        existing: &mut Map<String, Value>,
        incoming: &Map<String, Value>,
        prefix: &str,
    ) -> Result<(), MergeError> {
        for (key, value) in incoming {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            match existing.get_mut(key) {
                Some(slot) => self.merge_value(slot, value, &path)?,
                None => {
                    let fresh = self.fresh_value(value, &path)?;
                    existing.insert(key.clone(), fresh);
                }
            }
        }
        Ok(())
    }

    /// First value for a key: normalized through the same rules so that a
    /// second merge of the same fragment is a no-op.
    fn fresh_value(&self, value: &Value, path: &str) -> Result<Value, MergeError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                self.merge_maps(&mut out, map, path)?;
                Ok(Value::Object(out))
            }
            Value::Array(items) if self.rule_for(path) != Some(MergeRule::Overwrite) => {
                let mut out = Vec::with_capacity(items.len());
                concat_dedupe(&mut out, items);
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn merge_value(&self, slot: &mut Value, incoming: &Value, path: &str) -> Result<(), MergeError> {
        match self.rule_for(path) {
            Some(MergeRule::Overwrite) => {
                *slot = incoming.clone();
                Ok(())
            }
            Some(MergeRule::RejectOnConflict) => {
                if slot == incoming {
                    Ok(())
                } else {
                    Err(MergeError::Conflict {
                        path: path.to_string(),
                    })
                }
            }
            Some(MergeRule::ConcatDedupe) => match (slot, incoming) {
                (Value::Array(existing), Value::Array(items)) => {
                    concat_dedupe(existing, items);
                    Ok(())
                }
                (slot, incoming) => Err(shape_mismatch(path, slot, incoming)),
            },
            None => match (slot, incoming) {
                (Value::Object(existing), Value::Object(map)) => {
                    self.merge_maps(existing, map, path)
                }
                (Value::Array(existing), Value::Array(items)) => {
                    concat_dedupe(existing, items);
                    Ok(())
                }
                (slot, incoming) if is_container(slot) || is_container(incoming) => {
                    Err(shape_mismatch(path, slot, incoming))
                }
                (slot, incoming) => {
                    if slot != incoming {
                        tracing::debug!(key = %path, "Scalar policy key overwritten by later rail");
                    }
                    *slot = incoming.clone();
                    Ok(())
                }
            },
        }
    }
}

impl Default for MergeRuleTable {
    /// Pins `colang_version`: rails written for different flow-language
    /// versions cannot share one runtime.
    fn default() -> Self {
        Self::empty().with_rule("colang_version", MergeRule::RejectOnConflict)
    }
}

fn concat_dedupe(existing: &mut Vec<Value>, items: &[Value]) {
    for item in items {
        if !existing.contains(item) {
            existing.push(item.clone());
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn shape_mismatch(path: &str, existing: &Value, incoming: &Value) -> MergeError {
    MergeError::ShapeMismatch {
        path: path.to_string(),
        existing: kind(existing),
        incoming: kind(incoming),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
