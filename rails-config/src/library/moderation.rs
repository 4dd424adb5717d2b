//! Content moderation rails for user input and bot output.

use serde_json::json;

use crate::library::RailProvider;
use crate::types::RailFragment;

/// Provider for harmful-content moderation of user input.
pub struct InputModerationRail;

impl RailProvider for InputModerationRail {
    fn id(&self) -> &'static str {
        "input_moderation"
    }

    fn fragment(&self) -> RailFragment {
        RailFragment::new(self.id(), "Input Moderation (Harmful Content)")
            .with_policy(json!({"rails": {"input": {"flows": ["check input for harmful content"]}}}))
            .with_flow(
                r#"
                define flow check input for harmful content
                  user said something
                  $moderation_check = execute self_check_input(type='moderation')
                  if $moderation_check
                    bot refuse to respond
                "#,
            )
    }
}

/// Provider for unsafe-content moderation of bot output.
pub struct OutputModerationRail;

impl RailProvider for OutputModerationRail {
    fn id(&self) -> &'static str {
        "output_moderation"
    }

    fn fragment(&self) -> RailFragment {
        RailFragment::new(self.id(), "Output Moderation (Unsafe Content)")
            .with_policy(json!({"rails": {"output": {"flows": ["check output for unsafe content"]}}}))
            .with_flow(
                r#"
                define flow check output for unsafe content
                  bot said something
                  $unsafe_content_check = execute self_check_output(type='unsafe')
                  if $unsafe_content_check
                    bot refuse to respond
                "#,
            )
    }
}
