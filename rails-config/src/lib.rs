//! Rail fragment registry and configuration composer.
//!
//! Guardrails ("rails") are independent fragments: a partial policy tree,
//! flow-script blocks and an optional custom action. An operator picks a
//! selection at session start and the composer folds those fragments over a
//! base configuration into one validated [`ComposedConfiguration`].
//!
//! # Key Components
//!
//! - [`RailRegistry`]: closed, read-only catalog of fragments
//! - [`MergeRuleTable`]: per-key merge rules (overwrite, concat-dedupe, reject)
//! - [`ConfigComposer`]: deterministic composition with conflict checks
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rails_config::{BaseConfiguration, ConfigComposer, RailRegistry, SelectionSet};
//!
//! let registry = Arc::new(RailRegistry::builtin());
//! let selection = SelectionSet::parse("1 2", &registry).unwrap();
//! let base = BaseConfiguration::from_yaml("colang_version: \"2.x\"\n").unwrap();
//!
//! let composed = ConfigComposer::new(registry).compose(&base, &selection).unwrap();
//! assert!(composed.has_rail("cove"));
//! assert!(composed.has_rail("jailbreak_detection"));
//! ```

pub mod composed;
pub mod composer;
pub mod flow;
pub mod library;
pub mod merge;
pub mod registry;
pub mod types;

// Re-export main types
pub use composed::{ActiveRail, ComposedConfiguration};
pub use composer::{ComposeError, ConfigComposer, DEFAULT_RUNTIME_ACTIONS};
pub use library::cove::{COVE_ACTION_REF, SELF_CHECK_FACTS};
pub use merge::{MergeError, MergeRule, MergeRuleTable};
pub use registry::{RailRegistry, RailRegistryBuilder, RegistryError};
pub use types::*;
