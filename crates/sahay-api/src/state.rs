//! Shared application state for the API layer.

use std::sync::Arc;
use std::time::Instant;

use sahay_core::config::SahayConfig;
use sahay_pipeline::PipelineCoordinator;
use sahay_retrieval::DocumentIngestor;
use sahay_session::SessionManager;
use sahay_store::{DocumentStore, SessionArchive};

/// Shared state injected into every handler.
///
/// Everything is behind an Arc so the state clones cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    pub sessions: Arc<SessionManager>,
    pub ingestor: Arc<DocumentIngestor>,
    pub store: Arc<dyn DocumentStore>,
    pub archive: Arc<SessionArchive>,
    pub config: Arc<SahayConfig>,
    /// Server start time, for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: Arc<PipelineCoordinator>,
        sessions: Arc<SessionManager>,
        ingestor: Arc<DocumentIngestor>,
        store: Arc<dyn DocumentStore>,
        archive: Arc<SessionArchive>,
        config: Arc<SahayConfig>,
    ) -> Self {
        Self {
            coordinator,
            sessions,
            ingestor,
            store,
            archive,
            config,
            start_time: Instant::now(),
        }
    }
}
