//! Local stand-in collaborators.
//!
//! These take the place of on-device ASR/LLM/TTS models until real ones are
//! configured. The language model stand-in answers from the highest-ranked
//! knowledge-base excerpt in the prompt, so the kiosk stays useful in
//! text-only deployments.

use async_trait::async_trait;
use tracing::info;

use sahay_pipeline::{
    CollaboratorError, LanguageModel, SpeechRecognizer, SpeechSynthesizer, Transcription,
};

const EXCERPT_HEADER: &str = "Knowledge base excerpts:";
const DEFAULT_REPLY: &str =
    "Hello! I can help you with questions about the services available here. \
     Please ask me anything.";

/// Speech recognizer stand-in. Always unavailable; typed input still works.
pub struct StandInRecognizer;

#[async_trait]
impl SpeechRecognizer for StandInRecognizer {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "no speech recognition model configured".to_string(),
        ))
    }
}

/// Language model stand-in that answers from the top retrieved excerpt.
pub struct StandInModel;

impl StandInModel {
    /// Pull the content of the first excerpt out of an assembled prompt.
    fn first_excerpt(prompt: &str) -> Option<&str> {
        let after_header = &prompt[prompt.find(EXCERPT_HEADER)? + EXCERPT_HEADER.len()..];
        // Skip the "[1] title" line; the content follows on the next line.
        let title_line_end = after_header.find('\n')?;
        let rest = &after_header[title_line_end + 1..];
        let content_start = rest.find('\n')? + 1;
        let content = &rest[content_start..];
        let content_end = content
            .find("\n[")
            .or_else(|| content.find("\n\n"))
            .unwrap_or(content.len());
        let excerpt = content[..content_end].trim();
        (!excerpt.is_empty()).then_some(excerpt)
    }
}

#[async_trait]
impl LanguageModel for StandInModel {
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<String, CollaboratorError> {
        match Self::first_excerpt(prompt) {
            Some(excerpt) => Ok(excerpt.to_string()),
            None => Ok(DEFAULT_REPLY.to_string()),
        }
    }
}

/// Speech synthesizer stand-in. The response is displayed, not spoken.
pub struct StandInSynthesizer;

#[async_trait]
impl SpeechSynthesizer for StandInSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        info!(
            chars = text.len(),
            language = language.unwrap_or("default"),
            "Response displayed (no speech synthesis model configured)"
        );
        Ok(())
    }
}
