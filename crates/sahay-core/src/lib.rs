pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SahayConfig;
pub use error::{Result, SahayError};
pub use events::LifecycleEvent;
pub use types::*;
