//! Topical rail keeping the bot out of political discussion.

use serde_json::json;

use crate::library::RailProvider;
use crate::types::RailFragment;

/// Provider for the politics topical rail.
pub struct PoliticsTopicalRail;

impl RailProvider for PoliticsTopicalRail {
    fn id(&self) -> &'static str {
        "topical_politics"
    }

    fn fragment(&self) -> RailFragment {
        RailFragment::new(self.id(), "Topical Rails (Politics)")
            .with_policy(json!({
                "topical_rails": {
                    "topics": ["politics"],
                    "enabled": true,
                }
            }))
            .with_flow(
                r#"
                define user express intent on politics
                  "What are your thoughts on the recent election?"
                  "Tell me about the new government policy."
                "#,
            )
            .with_flow(
                r#"
                define flow
                  user express intent on politics
                  bot refuse to respond
                "#,
            )
    }
}
