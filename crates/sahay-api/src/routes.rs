//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, and all
//! endpoint handlers. The server binds to localhost only.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use sahay_core::error::SahayError;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS: allow localhost origins for the kiosk UI. The configured port
    // plus port+1 for a dev server.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            format!("http://127.0.0.1:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://127.0.0.1:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/interact", post(handlers::interact))
        .route("/presence", post(handlers::presence))
        .route("/session", get(handlers::get_session))
        .route("/session/end", post(handlers::end_session))
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route(
            "/documents/{id}",
            axum::routing::put(handlers::update_document).delete(handlers::delete_document),
        )
        .route("/sessions", get(handlers::session_history))
        .layer(DefaultBodyLimit::max(256 * 1024)) // 256KB, text-only payloads
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured port, localhost only.
pub async fn start_server(state: AppState) -> Result<(), SahayError> {
    let addr = format!("127.0.0.1:{}", state.config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use sahay_core::config::SahayConfig;
    use sahay_pipeline::{
        CollaboratorError, LanguageModel, PipelineCoordinator, SpeechRecognizer,
        SpeechSynthesizer, Transcription,
    };
    use sahay_retrieval::{
        DocumentIndex, DocumentIngestor, DynEmbeddingService, HashEmbedding, RetrievalEngine,
    };
    use sahay_session::SessionManager;
    use sahay_store::{Database, DocumentStore, SessionArchive, SqliteDocumentStore};

    use super::*;

    // ---- stub collaborators ----

    struct NullAsr;

    #[async_trait]
    impl SpeechRecognizer for NullAsr {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription, CollaboratorError> {
            Err(CollaboratorError::NoSpeechDetected)
        }
    }

    struct CannedLlm;

    #[async_trait]
    impl LanguageModel for CannedLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _max_tokens: u32,
        ) -> Result<String, CollaboratorError> {
            Ok("Canned answer.".to_string())
        }
    }

    struct NullTts;

    #[async_trait]
    impl SpeechSynthesizer for NullTts {
        async fn synthesize(
            &self,
            _text: &str,
            _language: Option<&str>,
        ) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    fn make_app() -> Router {
        let config = Arc::new(SahayConfig::default());
        let db = Arc::new(Database::in_memory().unwrap());
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db.clone()));
        let archive = Arc::new(SessionArchive::new(db));
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::default());
        let index = Arc::new(DocumentIndex::new(config.retrieval.embedding_dim));
        let engine = Arc::new(RetrievalEngine::new(
            index.clone(),
            embedder.clone(),
            config.retrieval.min_similarity,
        ));
        let ingestor = Arc::new(DocumentIngestor::new(
            store.clone(),
            index,
            embedder,
        ));
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
            Arc::new(NullAsr),
            Arc::new(CannedLlm),
            Arc::new(NullTts),
        ));

        let state = AppState::new(coordinator, sessions, ingestor, store, archive, config);
        create_router(state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    // ---- health ----

    #[tokio::test]
    async fn test_health_reports_idle() {
        let app = make_app();
        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session_state"], "idle");
        assert_eq!(body["presence"], false);
        assert_eq!(body["document_count"], 0);
    }

    // ---- interact ----

    #[tokio::test]
    async fn test_interact_starts_session_and_answers() {
        let app = make_app();
        let response = app
            .oneshot(json_request("POST", "/interact", json!({"text": "hello"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response_text"], "Canned answer.");
        assert_eq!(body["error"], false);
        assert_eq!(body["recorded"], true);
    }

    #[tokio::test]
    async fn test_interact_rejects_empty_text() {
        let app = make_app();
        let response = app
            .oneshot(json_request("POST", "/interact", json!({"text": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_interact_rejects_missing_input() {
        let app = make_app();
        let response = app
            .oneshot(json_request("POST", "/interact", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_interact_rejects_bad_base64() {
        let app = make_app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/interact",
                json!({"audio_b64": "not-base64!!!"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_interact_audio_without_speech_rejected() {
        let app = make_app();
        // Valid base64, but the recognizer finds no speech in it.
        let response = app
            .oneshot(json_request(
                "POST",
                "/interact",
                json!({"audio_b64": "AAAA"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "bad_request");
    }

    // ---- presence ----

    #[tokio::test]
    async fn test_presence_sample_accepted() {
        let app = make_app();
        let response = app
            .oneshot(json_request("POST", "/presence", json!({"present": true})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // A single sample is a candidate, not yet a confirmed appearance.
        assert_eq!(body["presence"], false);
        assert_eq!(body["session_state"], "idle");
    }

    // ---- session ----

    #[tokio::test]
    async fn test_get_session_404_when_idle() {
        let app = make_app();
        let response = app.oneshot(get_request("/session")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_http() {
        let app = make_app();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/interact", json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_request("/session")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "active");
        assert_eq!(body["turn_count"], 1);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/session/end", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["reason"], "manual_exit");
        assert_eq!(body["turn_count"], 1);

        // The ended session lands in the archive.
        let response = app.oneshot(get_request("/sessions")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(body["sessions"][0]["end_reason"], "manual_exit");
    }

    #[tokio::test]
    async fn test_end_session_conflict_when_idle() {
        let app = make_app();
        let response = app
            .oneshot(json_request("POST", "/session/end", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "conflict");
    }

    // ---- documents ----

    #[tokio::test]
    async fn test_document_crud_over_http() {
        let app = make_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/documents",
                json!({
                    "content": "The health camp runs every Tuesday morning.",
                    "title": "Health Camp",
                    "category": "services"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Health Camp");
        let id = body["id"].as_str().unwrap().to_string();

        let response = app.clone().oneshot(get_request("/documents")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["documents"][0]["category"], "services");
        assert_eq!(body["categories"][0]["category"], "services");
        assert_eq!(body["categories"][0]["count"], 1);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/documents/{}", id),
                json!({
                    "content": "The health camp now runs every Friday morning.",
                    "title": "Health Camp",
                    "category": "services"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], id);
        assert_eq!(
            body["content"],
            "The health camp now runs every Friday morning."
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/documents/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/documents")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_create_document_rejects_blank_content() {
        let app = make_app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/documents",
                json!({"content": "  ", "title": "Blank"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_document_404() {
        let app = make_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/documents/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ---- sessions history ----

    #[tokio::test]
    async fn test_session_history_empty() {
        let app = make_app();
        let response = app.oneshot(get_request("/sessions?limit=5")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sessions"].as_array().unwrap().len(), 0);
    }
}
