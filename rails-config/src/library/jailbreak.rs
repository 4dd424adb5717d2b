//! Jailbreak detection input rail.

use serde_json::json;

use crate::library::RailProvider;
use crate::types::RailFragment;

/// Provider for the jailbreak detection rail.
pub struct JailbreakRail;

impl RailProvider for JailbreakRail {
    fn id(&self) -> &'static str {
        "jailbreak_detection"
    }

    fn fragment(&self) -> RailFragment {
        RailFragment::new(self.id(), "Jailbreak Detection")
            .with_policy(json!({"rails": {"input": {"flows": ["check for jailbreak"]}}}))
            .with_flow(
                r#"
                define flow check for jailbreak
                  user said something
                  $jailbreak_check = execute self_check_input(type='jailbreak')
                  if $jailbreak_check
                    bot refuse to respond
                "#,
            )
    }
}
