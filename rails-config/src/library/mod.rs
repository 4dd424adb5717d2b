//! Built-in rail library.
//!
//! Each provider contributes one self-contained rail fragment. The registry
//! registers them in [`builtin_providers`] order, which is also the menu order.

pub mod cove;
pub mod jailbreak;
pub mod moderation;
pub mod topical;

pub use cove::CoveRail;
pub use jailbreak::JailbreakRail;
pub use moderation::{InputModerationRail, OutputModerationRail};
pub use topical::PoliticsTopicalRail;

use crate::types::RailFragment;

/// Trait for providers of built-in rail fragments.
pub trait RailProvider: Send + Sync {
    /// Identifier the fragment is registered under
    fn id(&self) -> &'static str;

    /// Build the fragment
    fn fragment(&self) -> RailFragment;
}

/// Providers for every built-in rail, in menu order.
pub fn builtin_providers() -> Vec<Box<dyn RailProvider>> {
    vec![
        Box::new(CoveRail),
        Box::new(JailbreakRail),
        Box::new(InputModerationRail),
        Box::new(OutputModerationRail),
        Box::new(PoliticsTopicalRail),
    ]
}
