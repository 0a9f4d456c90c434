//! Error types for session operations.

use parley_audio::AudioError;
use parley_core::ParleyError;

/// Reasons a session operation was refused or failed.
///
/// Gateway failures are not listed here: a failed reply becomes an apology
/// message and a failed correction is dropped, so neither reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("message cannot be empty")]
    EmptyInput,
    #[error("a response is already pending")]
    RequestInFlight,
    #[error("cannot send while recording")]
    RecordingInProgress,
    #[error("voice capture is already running")]
    AlreadyRecording,
    #[error("voice capture is not running")]
    NotRecording,
    #[error(transparent)]
    Microphone(#[from] AudioError),
}

impl SessionError {
    /// Refusals caused by another operation still being in progress.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionError::RequestInFlight
                | SessionError::RecordingInProgress
                | SessionError::AlreadyRecording
        )
    }
}

impl From<SessionError> for ParleyError {
    fn from(err: SessionError) -> Self {
        ParleyError::Session(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::EmptyInput.to_string(), "message cannot be empty");
        assert_eq!(
            SessionError::RequestInFlight.to_string(),
            "a response is already pending"
        );
        let mic: SessionError = AudioError::PermissionDenied("blocked".to_string()).into();
        assert_eq!(mic.to_string(), "microphone permission denied: blocked");
    }

    #[test]
    fn test_is_busy() {
        assert!(SessionError::RequestInFlight.is_busy());
        assert!(SessionError::RecordingInProgress.is_busy());
        assert!(SessionError::AlreadyRecording.is_busy());
        assert!(!SessionError::EmptyInput.is_busy());
        assert!(!SessionError::NotRecording.is_busy());
    }

    #[test]
    fn test_into_parley_error() {
        let err: ParleyError = SessionError::NotRecording.into();
        assert!(matches!(err, ParleyError::Session(_)));
        assert!(err.to_string().contains("not running"));
    }
}
