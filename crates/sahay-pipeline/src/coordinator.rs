//! Pipeline coordinator: sequences one visitor interaction end to end.
//!
//! Interactions are strictly serialized. Each one resolves input text,
//! gates on the session, retrieves excerpts, assembles the prompt, calls
//! generation with a timeout and a single retry, records the turn, and
//! hands the response to speech synthesis without waiting for it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use sahay_core::config::{ContextConfig, PipelineConfig, SahayConfig, SessionConfig};
use sahay_core::error::SahayError;
use sahay_core::types::{EndReason, Session, Turn};
use sahay_retrieval::{RetrievalEngine, RetrievalOutcome};
use sahay_session::{ConversationContext, SessionError, SessionManager};
use sahay_store::{DocumentStore, SessionArchive};

use crate::collaborators::{
    CollaboratorError, LanguageModel, SpeechRecognizer, SpeechSynthesizer,
};
use crate::prompt::{DocExcerpt, PromptBuilder};

/// Maximum input length in characters.
const MAX_INPUT_CHARS: usize = 2000;

/// One visitor input, either typed or spoken.
#[derive(Debug, Clone)]
pub enum InteractionInput {
    Text(String),
    Audio(Vec<u8>),
}

/// The outcome of one interaction turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub session_id: Uuid,
    pub user_text: String,
    pub response_text: String,
    pub retrieved_doc_ids: Vec<Uuid>,
    /// True when the response is the fallback after generation failed.
    pub error: bool,
    /// False when the session ended while the turn was in flight; the
    /// response is still returned but nothing was recorded.
    pub recorded: bool,
}

/// Per-session turn state, recreated whenever the session changes.
///
/// The failure streak is tracked here rather than derived from the context
/// window, so the consecutive-failure limit works even when it exceeds the
/// window size.
struct SessionTurnState {
    session_id: Uuid,
    window: ConversationContext,
    failure_streak: u32,
}

/// Coordinates the interaction pipeline across all components.
pub struct PipelineCoordinator {
    sessions: Arc<SessionManager>,
    engine: Arc<RetrievalEngine>,
    store: Arc<dyn DocumentStore>,
    archive: Arc<SessionArchive>,
    asr: Arc<dyn SpeechRecognizer>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    prompt: PromptBuilder,
    pipeline_cfg: PipelineConfig,
    session_cfg: SessionConfig,
    context_cfg: ContextConfig,
    top_k: usize,
    // Serializes interactions; a turn runs start to finish alone.
    interaction_lock: AsyncMutex<()>,
    // Context window and failure streak for the session they are tagged with.
    context: Mutex<Option<SessionTurnState>>,
}

impl PipelineCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &SahayConfig,
        sessions: Arc<SessionManager>,
        engine: Arc<RetrievalEngine>,
        store: Arc<dyn DocumentStore>,
        archive: Arc<SessionArchive>,
        asr: Arc<dyn SpeechRecognizer>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            sessions,
            engine,
            store,
            archive,
            asr,
            llm,
            tts,
            prompt: PromptBuilder::new(config.pipeline.system_instructions.clone()),
            pipeline_cfg: config.pipeline.clone(),
            session_cfg: config.session.clone(),
            context_cfg: config.context.clone(),
            top_k: config.retrieval.top_k,
            interaction_lock: AsyncMutex::new(()),
            context: Mutex::new(None),
        }
    }

    /// Run one interaction through the full pipeline.
    ///
    /// Input validation failures and session gating failures return an
    /// error before anything is recorded. Generation failures never
    /// propagate; they degrade to the fallback response with `error` set.
    pub async fn submit(&self, input: InteractionInput) -> Result<TurnOutput, SahayError> {
        let _guard = self.interaction_lock.lock().await;

        let (user_text, language) = self.resolve_input(input).await?;

        // Session gate.
        let session_id = match self.sessions.current()? {
            Some(session) => session.id,
            None if self.session_cfg.start_on_first_input => {
                self.sessions.start_session(Utc::now())?
            }
            None => return Err(SahayError::NoActiveSession),
        };

        // Render the context window, recreating it when the session changed.
        let context_text = {
            let mut slot = self.lock_context()?;
            match slot.as_ref() {
                Some(state) if state.session_id == session_id => state.window.render(),
                _ => {
                    *slot = Some(SessionTurnState {
                        session_id,
                        window: ConversationContext::new(
                            self.context_cfg.max_turns,
                            self.context_cfg.char_budget,
                        ),
                        failure_streak: 0,
                    });
                    String::new()
                }
            }
        };

        // Retrieval. Failures degrade to a miss rather than killing the turn.
        let outcome = match self.engine.retrieve_text(&user_text, self.top_k).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, generating without excerpts");
                RetrievalOutcome::Miss
            }
        };
        let retrieved_doc_ids: Vec<Uuid> =
            outcome.results().iter().map(|r| r.doc_id).collect();

        let mut excerpts = Vec::new();
        for result in outcome.results() {
            match self.store.get(result.doc_id) {
                Ok(Some(doc)) => excerpts.push(DocExcerpt {
                    title: doc.metadata.title,
                    content: doc.content,
                }),
                Ok(None) => {}
                Err(e) => warn!(doc_id = %result.doc_id, error = %e, "Excerpt fetch failed"),
            }
        }

        let prompt = self.prompt.build(&context_text, &excerpts, &user_text);
        let (response_text, error) = self.generate_with_retry(&prompt).await;

        let turn = Turn {
            user_text: user_text.clone(),
            response_text: response_text.clone(),
            retrieved_doc_ids: retrieved_doc_ids.clone(),
            timestamp: Utc::now(),
            error,
        };

        // The session may have ended while generation ran. In that case the
        // turn is dropped whole; a turn never lands in a dead session.
        let recorded = match self.sessions.record_turn(session_id, turn.clone()) {
            Ok(()) => true,
            Err(SessionError::NoActiveSession) => {
                info!(session_id = %session_id, "Session ended mid-turn, turn discarded");
                false
            }
            Err(e) => return Err(e.into()),
        };

        if recorded {
            let failure_streak = {
                let mut slot = self.lock_context()?;
                match slot.as_mut() {
                    Some(state) if state.session_id == session_id => {
                        state.window.append(turn);
                        if error {
                            state.failure_streak += 1;
                        } else {
                            state.failure_streak = 0;
                        }
                        state.failure_streak
                    }
                    _ => 0,
                }
            };

            if error && failure_streak >= self.session_cfg.max_consecutive_failures {
                warn!(
                    session_id = %session_id,
                    failures = failure_streak,
                    "Consecutive failure limit reached, ending session"
                );
                self.end_session(EndReason::RepeatedFailure)?;
            }
        }

        self.spawn_synthesis(response_text.clone(), language);

        Ok(TurnOutput {
            session_id,
            user_text,
            response_text,
            retrieved_doc_ids,
            error,
            recorded,
        })
    }

    /// End the current session for the given reason and archive it.
    pub fn end_session(&self, reason: EndReason) -> Result<Session, SahayError> {
        let now = Utc::now();
        let session = self.sessions.end_session(reason, now)?;
        self.archive.archive(&session, reason, now)?;
        self.clear_context();
        Ok(session)
    }

    /// Run one idle timeout check, archiving the session if it expired.
    ///
    /// Intended to be called from a periodic watchdog task.
    pub fn run_idle_check(&self) -> Result<Option<Session>, SahayError> {
        let now = Utc::now();
        match self.sessions.check_idle_timeout(now)? {
            Some(session) => {
                self.archive.archive(&session, EndReason::IdleTimeout, now)?;
                self.clear_context();
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn resolve_input(
        &self,
        input: InteractionInput,
    ) -> Result<(String, Option<String>), SahayError> {
        match input {
            InteractionInput::Text(text) => {
                let trimmed = text.trim().to_string();
                if trimmed.is_empty() {
                    return Err(SahayError::Input(
                        "Input text must not be empty".to_string(),
                    ));
                }
                if trimmed.chars().count() > MAX_INPUT_CHARS {
                    return Err(SahayError::Input(format!(
                        "Input exceeds {} characters",
                        MAX_INPUT_CHARS
                    )));
                }
                Ok((trimmed, None))
            }
            InteractionInput::Audio(audio) => {
                if audio.is_empty() {
                    return Err(SahayError::Input("Audio clip is empty".to_string()));
                }
                let budget = self.pipeline_cfg.asr_timeout_ms;
                let transcription = match tokio::time::timeout(
                    Duration::from_millis(budget),
                    self.asr.transcribe(&audio),
                )
                .await
                {
                    Ok(Ok(transcription)) => transcription,
                    Ok(Err(CollaboratorError::NoSpeechDetected)) => {
                        return Err(SahayError::Input("No speech detected".to_string()))
                    }
                    Ok(Err(e)) => return Err(e.into_upstream("asr")),
                    Err(_) => {
                        return Err(SahayError::Timeout {
                            service: "asr".to_string(),
                            budget_ms: budget,
                        })
                    }
                };
                let text = transcription.text.trim().to_string();
                if text.is_empty() {
                    return Err(SahayError::Input("No speech detected".to_string()));
                }
                Ok((text, transcription.language))
            }
        }
    }

    async fn generate_with_retry(&self, prompt: &str) -> (String, bool) {
        match self.try_generate(prompt).await {
            Ok(text) => (text, false),
            Err(first) => {
                warn!(error = %first, "Generation failed, retrying once");
                tokio::time::sleep(Duration::from_millis(self.pipeline_cfg.retry_backoff_ms))
                    .await;
                match self.try_generate(prompt).await {
                    Ok(text) => (text, false),
                    Err(second) => {
                        warn!(error = %second, "Generation failed after retry, using fallback");
                        (self.pipeline_cfg.fallback_text.clone(), true)
                    }
                }
            }
        }
    }

    async fn try_generate(&self, prompt: &str) -> Result<String, SahayError> {
        let budget = self.pipeline_cfg.llm_timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(budget),
            self.llm.generate(prompt, self.pipeline_cfg.max_tokens),
        )
        .await
        {
            Ok(Ok(text)) => {
                if text.trim().is_empty() {
                    Err(CollaboratorError::InvalidResponse("empty generation".to_string())
                        .into_upstream("llm"))
                } else {
                    Ok(text)
                }
            }
            Ok(Err(e)) => Err(e.into_upstream("llm")),
            Err(_) => Err(SahayError::Timeout {
                service: "llm".to_string(),
                budget_ms: budget,
            }),
        }
    }

    /// Hand the response to speech synthesis without blocking the turn.
    fn spawn_synthesis(&self, text: String, language: Option<String>) {
        let tts = Arc::clone(&self.tts);
        let budget = self.pipeline_cfg.tts_timeout_ms;
        tokio::spawn(async move {
            match tokio::time::timeout(
                Duration::from_millis(budget),
                tts.synthesize(&text, language.as_deref()),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Speech synthesis failed"),
                Err(_) => warn!(budget_ms = budget, "Speech synthesis timed out"),
            }
        });
    }

    fn lock_context(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<SessionTurnState>>, SahayError> {
        self.context
            .lock()
            .map_err(|e| SahayError::Session(format!("Context lock poisoned: {}", e)))
    }

    fn clear_context(&self) {
        if let Ok(mut slot) = self.context.lock() {
            *slot = None;
        }
    }
}
