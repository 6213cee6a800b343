//! Collaborator traits for the external model services.
//!
//! The coordinator only knows these traits. Production wiring supplies the
//! locally hosted backends; tests supply scripted implementations.

use async_trait::async_trait;
use thiserror::Error;

use sahay_core::error::SahayError;

/// Failure modes shared by all collaborator services.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("No speech detected in audio")]
    NoSpeechDetected,

    #[error("Service rate limited")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Convert into the top-level error, tagged with the failing service.
    pub fn into_upstream(self, service: &str) -> SahayError {
        SahayError::Upstream {
            service: service.to_string(),
            reason: self.to_string(),
        }
    }
}

/// The result of transcribing an audio clip.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    /// BCP 47 language tag detected by the recognizer, if any.
    pub language: Option<String>,
}

/// Speech-to-text service.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription, CollaboratorError>;
}

/// Text generation service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, CollaboratorError>;
}

/// Text-to-speech service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: Option<&str>)
        -> Result<(), CollaboratorError>;
}
