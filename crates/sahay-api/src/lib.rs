//! Sahay API crate - the local HTTP surface.
//!
//! Exposes health, interaction, presence, session, and document endpoints
//! over a localhost-only axum server.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
