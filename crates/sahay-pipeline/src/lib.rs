//! Sahay Pipeline crate - the interaction pipeline coordinator.
//!
//! Sequences one visitor interaction end to end: speech recognition,
//! retrieval, prompt assembly, generation with timeout and retry, turn
//! recording, and fire-and-forget speech synthesis.

pub mod collaborators;
pub mod coordinator;
pub mod prompt;

pub use collaborators::{
    CollaboratorError, LanguageModel, SpeechRecognizer, SpeechSynthesizer, Transcription,
};
pub use coordinator::{InteractionInput, PipelineCoordinator, TurnOutput};
pub use prompt::{DocExcerpt, PromptBuilder};
