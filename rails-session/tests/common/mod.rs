//! A scripted rails runtime standing in for the flow interpreter.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rails_config::{BaseConfiguration, ComposedConfiguration, ConfigComposer, RailRegistry, SelectionSet};
use rails_session::{ActionParams, RailsRuntime, RuntimeDecision, RuntimeError, Turn};
use serde_json::json;

pub const REFUSAL: &str = "I'm sorry, I can't respond to that.";

const INJECTION_MARKERS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "disregard your rules",
];

/// What the runtime was asked to do, shared with the test.
#[derive(Debug, Default)]
pub struct Probe {
    pub ingested: Option<String>,
    pub registered: Vec<String>,
    pub history_lengths: Vec<usize>,
}

/// Interprets just enough of the built-in flows: the jailbreak input rail
/// refuses injection attempts, the fact-checking output rail hands the
/// message to `self_check_facts`, anything else gets a canned answer.
pub struct ScriptedRuntime {
    probe: Arc<Mutex<Probe>>,
    flow_script: String,
    fail_ingest: bool,
}

impl ScriptedRuntime {
    pub fn new() -> (Self, Arc<Mutex<Probe>>) {
        let probe = Arc::new(Mutex::new(Probe::default()));
        let runtime = Self {
            probe: probe.clone(),
            flow_script: String::new(),
            fail_ingest: false,
        };
        (runtime, probe)
    }

    pub fn failing_ingest() -> (Self, Arc<Mutex<Probe>>) {
        let (mut runtime, probe) = Self::new();
        runtime.fail_ingest = true;
        (runtime, probe)
    }

    fn has_flow(&self, name: &str) -> bool {
        self.flow_script.contains(&format!("define flow {name}\n"))
    }
}

#[async_trait]
impl RailsRuntime for ScriptedRuntime {
    async fn ingest(&mut self, config: &ComposedConfiguration) -> Result<(), RuntimeError> {
        if self.fail_ingest {
            return Err(RuntimeError::Ingest("unsupported model engine".to_string()));
        }
        config
            .policy_yaml()
            .map_err(|e| RuntimeError::Ingest(e.to_string()))?;
        self.flow_script = config.flow_script();
        self.probe.lock().unwrap().ingested = Some(config.fingerprint().to_string());
        Ok(())
    }

    fn register_action(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.probe.lock().unwrap().registered.push(name.to_string());
        Ok(())
    }

    async fn generate(
        &mut self,
        history: &[Turn],
        message: &str,
    ) -> Result<RuntimeDecision, RuntimeError> {
        self.probe.lock().unwrap().history_lengths.push(history.len());

        let lowered = message.to_lowercase();
        if self.has_flow("check for jailbreak")
            && INJECTION_MARKERS.iter().any(|m| lowered.contains(m))
        {
            return Ok(RuntimeDecision::Refuse {
                rail: "jailbreak_detection".to_string(),
                message: REFUSAL.to_string(),
            });
        }

        let registered = self.probe.lock().unwrap().registered.clone();
        if self.has_flow("self check facts") && registered.iter().any(|r| r == "self_check_facts") {
            let mut params = ActionParams::new();
            params.insert("user_message".to_string(), json!(message));
            return Ok(RuntimeDecision::InvokeAction {
                name: "self_check_facts".to_string(),
                params,
            });
        }

        if message.trim().is_empty() {
            return Ok(RuntimeDecision::Respond(String::new()));
        }
        Ok(RuntimeDecision::Respond(format!("You said: {message}")))
    }
}

pub fn compose(ids: &[&str]) -> Arc<ComposedConfiguration> {
    let base = BaseConfiguration::from_yaml(
        "models:\n  - type: main\n    engine: ollama\n    model: llama3\ncolang_version: \"2.x\"\n",
    )
    .unwrap();
    let composed = ConfigComposer::new(Arc::new(RailRegistry::builtin()))
        .compose(&base, &SelectionSet::new(ids.iter().copied()))
        .unwrap();
    Arc::new(composed)
}
