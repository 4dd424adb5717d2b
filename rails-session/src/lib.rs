//! Rails Session - conversations bound to composed guardrail configurations
//!
//! A [`Session`] activates one [`rails_config::ComposedConfiguration`] on a
//! rails runtime, resolves the actions its rails bind, and routes every user
//! turn through the runtime:
//!
//! ```text
//! user message ──► RailsRuntime ──► Respond ─────────────► answer
//!                       │       └─► Refuse ──────────────► refusal
//!                       └─► InvokeAction ──► RailAction ─► (verified) answer
//!                                            (CoveAction)
//! ```

pub mod action;
pub mod runtime;
pub mod session;

// Re-export main types
pub use action::{ActionCatalog, ActionContext, ActionError, ActionOutput, CoveAction, RailAction};
pub use runtime::{ActionParams, RailsRuntime, RuntimeDecision, RuntimeError, Speaker, Turn};
pub use session::{ResponseKind, Session, SessionError, TurnResponse};
