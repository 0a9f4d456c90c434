//! Error types for microphone capture and audio encoding.

use parley_core::ParleyError;

/// Errors from the audio layer.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio encoding error: {0}")]
    Encoding(String),
}

impl AudioError {
    /// Whether the failure came from the user or OS refusing microphone access.
    pub fn is_permission(&self) -> bool {
        matches!(self, AudioError::PermissionDenied(_))
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::Encoding(err.to_string())
    }
}

impl From<AudioError> for ParleyError {
    fn from(err: AudioError) -> Self {
        ParleyError::Audio(err.to_string())
    }
}
