//! Bounded per-session conversation history.
//!
//! Each session owns one [`ConversationContext`]; the [`SessionRegistry`]
//! hands them out and tears them down.

pub mod conversation;
pub mod registry;

pub use conversation::{
    ContextSummary, ConversationContext, Feedback, SessionId, Turn, TurnId, TurnStatus,
};
pub use registry::{SessionHandle, SessionRegistry};
