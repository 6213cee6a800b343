//! Sahay Session crate - session lifecycle, presence debouncing, and the
//! conversation context window.
//!
//! The SessionManager owns the single session slot and enforces the
//! idle/active/closing state machine. The PresenceDebouncer turns a raw
//! presence signal into clean edges, and the ConversationContext renders
//! recent turns into prompt text under a character budget.

pub mod context;
pub mod error;
pub mod manager;
pub mod presence;
pub mod state;

pub use context::ConversationContext;
pub use error::SessionError;
pub use manager::SessionManager;
pub use presence::{PresenceDebouncer, PresenceEdge};
pub use state::validate_transition;
