//! Configuration for the verification pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Policy section a composed configuration carries these settings under.
pub const POLICY_SECTION: &str = "cove";

/// Configuration for a [`crate::CovePipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoveConfig {
    /// Verification questions kept from the plan, in generation order
    pub max_questions: usize,
    /// Timeout applied to every model call (ms)
    pub call_timeout_ms: u64,
    /// Token limit per call, if any
    pub max_tokens: Option<u32>,
    /// Sampling temperature for baseline and revision
    pub answer_temperature: f32,
    /// Sampling temperature for planning and independent answers
    pub verify_temperature: f32,
}

impl Default for CoveConfig {
    fn default() -> Self {
        Self {
            max_questions: 8,
            call_timeout_ms: 30_000,
            max_tokens: None,
            answer_temperature: 0.7,
            verify_temperature: 0.0,
        }
    }
}

impl CoveConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Read the `cove:` section of a merged policy tree.
    ///
    /// A missing section yields the defaults; keys the section leaves out
    /// keep their defaults too.
    pub fn from_policy(policy: &Value) -> Result<Self, serde_json::Error> {
        match policy.get(POLICY_SECTION) {
            Some(section) if !section.is_null() => serde_json::from_value(section.clone()),
            _ => Ok(Self::default()),
        }
    }

    /// Builder: set the question cap.
    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    /// Builder: set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-call timeout as a duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = CoveConfig::default();
        assert_eq!(config.max_questions, 8);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = CoveConfig::default().with_max_questions(3);
        let yaml = config.to_yaml().unwrap();
        let parsed = CoveConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_policy_section() {
        let policy = json!({
            "models": [],
            "cove": {"max_questions": 4, "call_timeout_ms": 500}
        });

        let config = CoveConfig::from_policy(&policy).unwrap();
        assert_eq!(config.max_questions, 4);
        assert_eq!(config.call_timeout_ms, 500);
        assert_eq!(config.verify_temperature, 0.0);
    }

    #[test]
    fn test_from_policy_without_section() {
        let config = CoveConfig::from_policy(&json!({"models": []})).unwrap();
        assert_eq!(config, CoveConfig::default());
    }

    #[test]
    fn test_from_policy_rejects_bad_types() {
        assert!(CoveConfig::from_policy(&json!({"cove": {"max_questions": "many"}})).is_err());
    }
}
