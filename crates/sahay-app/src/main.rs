//! Sahay kiosk binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML, with CLI and env overrides
//! 2. Open SQLite storage and rebuild the retrieval index
//! 3. Seed the knowledge base on first run
//! 4. Start the idle watchdog and lifecycle event logger
//! 5. Start the axum REST API server

mod cli;
mod stubs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use sahay_api::{routes, AppState};
use sahay_core::config::SahayConfig;
use sahay_core::types::{DocumentMetadata, EndReason};
use sahay_pipeline::PipelineCoordinator;
use sahay_retrieval::{
    DocumentIndex, DocumentIngestor, DynEmbeddingService, HashEmbedding, RetrievalEngine,
};
use sahay_session::SessionManager;
use sahay_store::{Database, DocumentStore, SessionArchive, SqliteDocumentStore};

use cli::CliArgs;
use stubs::{StandInModel, StandInRecognizer, StandInSynthesizer};

const IDLE_CHECK_INTERVAL_SECS: u64 = 1;

/// Documents loaded into an empty knowledge base on first run.
const SEED_DOCUMENTS: [(&str, &str, &str); 3] = [
    (
        "Welcome to Kiosk",
        "This is an AI-powered kiosk that can help you with various queries. \
         You can ask questions about services, products, or general information.",
        "general",
    ),
    (
        "Services Available",
        "Our kiosk provides information about banking services, healthcare \
         facilities, government services, and retail information.",
        "services",
    ),
    (
        "How to Use",
        "Simply speak or type your question. The kiosk will understand your \
         query and provide relevant information. You can ask in English or Hindi.",
        "help",
    ),
];

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Seed the knowledge base when it is empty.
async fn seed_documents(ingestor: &DocumentIngestor, store: &dyn DocumentStore) {
    match store.count() {
        Ok(0) => {}
        Ok(_) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Could not check document count, skipping seed");
            return;
        }
    }

    for (title, content, category) in SEED_DOCUMENTS {
        let metadata = DocumentMetadata {
            title: title.to_string(),
            category: category.to_string(),
            source: "seed".to_string(),
        };
        match ingestor.ingest(content, metadata).await {
            Ok(doc) => tracing::info!(doc_id = %doc.id, title, "Seed document added"),
            Err(e) => tracing::warn!(title, error = %e, "Seed document failed"),
        }
    }
}

/// Periodically end sessions that idle past the timeout.
async fn idle_watchdog(coordinator: Arc<PipelineCoordinator>) {
    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(IDLE_CHECK_INTERVAL_SECS));
    loop {
        interval.tick().await;
        match coordinator.run_idle_check() {
            Ok(Some(session)) => {
                tracing::info!(session_id = %session.id, "Session ended by idle timeout");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Idle check failed"),
        }
    }
}

/// Log every lifecycle event the session manager publishes.
async fn event_logger(sessions: Arc<SessionManager>) {
    let mut rx = sessions.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::debug!(event = event.event_name(), at = %event.timestamp(), "Lifecycle event");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config, with CLI and env overrides.
    let config_file = args.resolve_config_path();
    let mut config = SahayConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.general.log_level.clone())
            }),
        )
        .init();

    tracing::info!("Starting Sahay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("sahay.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db.clone()));
    let archive = Arc::new(SessionArchive::new(db));

    // Retrieval.
    let embedder: Arc<dyn DynEmbeddingService> =
        Arc::new(HashEmbedding::new(config.retrieval.embedding_dim));
    let index = Arc::new(DocumentIndex::new(config.retrieval.embedding_dim));
    let engine = Arc::new(RetrievalEngine::new(
        index.clone(),
        embedder.clone(),
        config.retrieval.min_similarity,
    ));
    let ingestor = Arc::new(DocumentIngestor::new(store.clone(), index, embedder));
    ingestor.load_from_store()?;
    seed_documents(&ingestor, store.as_ref()).await;

    // Session and pipeline.
    let sessions = Arc::new(SessionManager::new(
        config.presence.idle_timeout_secs,
        config.presence.debounce_ms,
    ));
    let coordinator = Arc::new(PipelineCoordinator::new(
        &config,
        sessions.clone(),
        engine,
        store.clone(),
        archive.clone(),
        Arc::new(StandInRecognizer),
        Arc::new(StandInModel),
        Arc::new(StandInSynthesizer),
    ));

    // Background tasks.
    tokio::spawn(idle_watchdog(coordinator.clone()));
    tokio::spawn(event_logger(sessions.clone()));

    // On ctrl-c, archive any open session before exiting.
    let shutdown_coordinator = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            match shutdown_coordinator.end_session(EndReason::Shutdown) {
                Ok(session) => {
                    tracing::info!(session_id = %session.id, "Open session archived on shutdown");
                }
                Err(sahay_core::error::SahayError::NoActiveSession) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to archive session on shutdown"),
            }
            std::process::exit(0);
        }
    });

    // API server.
    let config = Arc::new(config);
    let state = AppState::new(
        coordinator,
        sessions,
        ingestor,
        store,
        archive,
        config.clone(),
    );

    tracing::info!(port = config.general.port, "Sahay ready");
    routes::start_server(state).await?;

    Ok(())
}
