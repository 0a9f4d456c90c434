//! Parley gateway crate - the boundary to the remote inference service.
//!
//! Defines the `InferenceGateway` trait the session controller calls for
//! text generation, speech-to-text, and text-to-speech, a Hugging Face
//! Inference API client, and a scripted implementation for tests.

pub mod error;
pub mod huggingface;
pub mod mock;

use async_trait::async_trait;

use parley_core::AudioPayload;

pub use error::GatewayError;
pub use huggingface::HuggingFaceGateway;
pub use mock::ScriptedGateway;

/// Remote text generation, speech recognition, and speech synthesis.
///
/// Single request, single response; no streaming. Errors are returned to the
/// caller as-is, retry policy is the caller's business.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Generate a continuation for `prompt`.
    async fn generate_response(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Transcribe a recorded clip. May return an empty string.
    async fn speech_to_text(&self, audio: AudioPayload) -> Result<String, GatewayError>;

    /// Synthesize speech for `text`.
    async fn text_to_speech(&self, text: &str) -> Result<AudioPayload, GatewayError>;
}
