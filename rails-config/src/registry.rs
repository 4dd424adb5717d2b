//! Rail Fragment Registry.
//!
//! A closed catalog of rail fragments, populated once at startup and
//! read-only afterwards. Share it behind an `Arc`; reads need no locking.

use std::collections::HashMap;

use crate::library::builtin_providers;
use crate::types::RailFragment;

/// Error types for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No fragment registered under this id
    #[error("Rail not found: {0}")]
    NotFound(String),

    /// Two fragments registered under the same id
    #[error("Rail registered twice: {0}")]
    DuplicateRail(String),

    /// Fragment definition document could not be read
    #[error("Invalid rail definitions: {0}")]
    InvalidDefinition(String),
}

/// Immutable catalog of rail fragments.
#[derive(Debug, Clone)]
pub struct RailRegistry {
    /// Fragments in registration order
    fragments: Vec<RailFragment>,
    /// Position of each id in `fragments`
    index: HashMap<String, usize>,
}

impl RailRegistry {
    /// Start building a registry.
    pub fn builder() -> RailRegistryBuilder {
        RailRegistryBuilder::default()
    }

    /// Registry holding the built-in rail library.
    pub fn builtin() -> Self {
        let mut builder = Self::builder();
        for provider in builtin_providers() {
            builder = builder.register_unchecked(provider.fragment());
        }
        builder.build()
    }

    /// Build a registry from a YAML list of fragment definitions.
    ///
    /// ```yaml
    /// - id: topical_religion
    ///   label: Topical Rails (Religion)
    ///   policy:
    ///     topical_rails:
    ///       topics: [religion]
    ///   flows:
    ///     - |
    ///       define flow
    ///         user express intent on religion
    ///         bot refuse to respond
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let fragments = parse_definitions(yaml)?;
        let mut builder = Self::builder();
        for fragment in fragments {
            builder = builder.register(fragment)?;
        }
        Ok(builder.build())
    }

    /// Look up a fragment by id.
    pub fn lookup(&self, id: &str) -> Result<&RailFragment, RegistryError> {
        self.index
            .get(id)
            .map(|&i| &self.fragments[i])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// `(id, label)` pairs in registration order, for menu display.
    pub fn list_available(&self) -> Vec<(String, String)> {
        self.fragments
            .iter()
            .map(|f| (f.id.clone(), f.label.clone()))
            .collect()
    }

    /// Resolve a menu choice: either a registered id or a 1-based position.
    pub fn resolve_choice(&self, choice: &str) -> Result<String, RegistryError> {
        if self.contains(choice) {
            return Ok(choice.to_string());
        }

        choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.fragments.get(i))
            .map(|f| f.id.clone())
            .ok_or_else(|| RegistryError::NotFound(choice.to_string()))
    }

    /// Number of registered fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Builder for [`RailRegistry`]; the only way to add fragments.
#[derive(Debug, Default)]
pub struct RailRegistryBuilder {
    fragments: Vec<RailFragment>,
}

impl RailRegistryBuilder {
    /// Register a fragment. Ids must be unique.
    pub fn register(mut self, fragment: RailFragment) -> Result<Self, RegistryError> {
        if self.fragments.iter().any(|f| f.id == fragment.id) {
            return Err(RegistryError::DuplicateRail(fragment.id));
        }
        self.fragments.push(fragment);
        Ok(self)
    }

    /// Register every built-in rail.
    pub fn with_builtin(mut self) -> Result<Self, RegistryError> {
        for provider in builtin_providers() {
            self = self.register(provider.fragment())?;
        }
        Ok(self)
    }

    /// Register the fragments defined in a YAML document.
    pub fn with_yaml(mut self, yaml: &str) -> Result<Self, RegistryError> {
        for fragment in parse_definitions(yaml)? {
            self = self.register(fragment)?;
        }
        Ok(self)
    }

    /// Freeze into a registry.
    pub fn build(self) -> RailRegistry {
        let index = self
            .fragments
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();

        tracing::debug!(rails = self.fragments.len(), "Rail registry built");

        RailRegistry {
            fragments: self.fragments,
            index,
        }
    }

    // Built-in providers have distinct ids by construction.
    fn register_unchecked(mut self, fragment: RailFragment) -> Self {
        self.fragments.push(fragment);
        self
    }
}

fn parse_definitions(yaml: &str) -> Result<Vec<RailFragment>, RegistryError> {
    let definitions: Vec<RailFragment> = serde_yaml::from_str(yaml)
        .map_err(|e| RegistryError::InvalidDefinition(e.to_string()))?;

    // Flows written in YAML get the same normalization as built-in ones.
    definitions
        .into_iter()
        .map(|mut fragment| {
            if !fragment.policy.is_object() {
                return Err(RegistryError::InvalidDefinition(format!(
                    "policy of rail '{}' must be a mapping",
                    fragment.id
                )));
            }
            fragment.flows = fragment
                .flows
                .iter()
                .map(|f| crate::flow::normalize_block(f))
                .collect();
            Ok(fragment)
        })
        .collect()
}
