//! Session status and admission rules.
//!
//! Status is derived from two activity flags rather than stored:
//! - Idle -> AwaitingResponse (submit / correction)
//! - AwaitingResponse -> Idle (reply, apology, or swallowed failure)
//! - Idle -> Recording (voice capture started)
//! - Recording -> Idle (voice capture stopped)
//!
//! Whether recording and an outstanding request may overlap is decided by
//! the [`OverlapPolicy`].

use std::fmt;

use crate::error::SessionError;

/// Observable state of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Nothing outstanding. Ready for input.
    Idle,
    /// A generation request is in flight.
    AwaitingResponse,
    /// The microphone is held and buffering audio.
    Recording,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::AwaitingResponse => write!(f, "AwaitingResponse"),
            SessionStatus::Recording => write!(f, "Recording"),
        }
    }
}

/// Whether voice capture and an outstanding response may coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Recording and awaiting a response exclude each other in both directions.
    #[default]
    Exclusive,
    /// Capture may start while a response is pending, and a request may be
    /// sent while recording.
    AllowVoiceDuringResponse,
}

impl OverlapPolicy {
    pub fn from_flag(allow_voice_during_response: bool) -> Self {
        if allow_voice_during_response {
            OverlapPolicy::AllowVoiceDuringResponse
        } else {
            OverlapPolicy::Exclusive
        }
    }
}

/// What the typing indicator and recording toggle should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub status: SessionStatus,
    pub typing: bool,
    pub recording: bool,
}

impl Default for Indicator {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            typing: false,
            recording: false,
        }
    }
}

/// Activity flags behind the derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    awaiting_response: bool,
    typing: bool,
    recording: bool,
    /// Set while the microphone is being opened, so a second start is refused.
    opening_microphone: bool,
}

impl Activity {
    /// Derived status. Recording wins when both flags are set.
    pub fn status(&self) -> SessionStatus {
        if self.recording {
            SessionStatus::Recording
        } else if self.awaiting_response {
            SessionStatus::AwaitingResponse
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn capture_engaged(&self) -> bool {
        self.recording || self.opening_microphone
    }

    pub fn indicator(&self) -> Indicator {
        Indicator {
            status: self.status(),
            typing: self.typing,
            recording: self.recording,
        }
    }

    /// Check that a generation request may start.
    pub fn admit_request(&self, policy: OverlapPolicy) -> Result<(), SessionError> {
        if self.awaiting_response {
            return Err(SessionError::RequestInFlight);
        }
        if self.capture_engaged() && policy == OverlapPolicy::Exclusive {
            return Err(SessionError::RecordingInProgress);
        }
        Ok(())
    }

    /// Check that voice capture may start.
    pub fn admit_capture(&self, policy: OverlapPolicy) -> Result<(), SessionError> {
        if self.capture_engaged() {
            return Err(SessionError::AlreadyRecording);
        }
        if self.awaiting_response && policy == OverlapPolicy::Exclusive {
            return Err(SessionError::RequestInFlight);
        }
        Ok(())
    }

    pub fn begin_request(&mut self) {
        tracing::debug!("Session request started ({} -> AwaitingResponse)", self.status());
        self.awaiting_response = true;
        self.typing = true;
    }

    pub fn end_request(&mut self) {
        self.awaiting_response = false;
        self.typing = false;
        tracing::debug!("Session request finished (now {})", self.status());
    }

    pub fn begin_opening_microphone(&mut self) {
        self.opening_microphone = true;
    }

    /// Settle a microphone open attempt. `opened` says whether a stream is now held.
    pub fn finish_opening_microphone(&mut self, opened: bool) {
        self.opening_microphone = false;
        if opened {
            self.recording = true;
            tracing::debug!("Voice capture started (now {})", self.status());
        }
    }

    pub fn end_recording(&mut self) {
        self.recording = false;
        tracing::debug!("Voice capture stopped (now {})", self.status());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Idle.to_string(), "Idle");
        assert_eq!(
            SessionStatus::AwaitingResponse.to_string(),
            "AwaitingResponse"
        );
        assert_eq!(SessionStatus::Recording.to_string(), "Recording");
    }

    #[test]
    fn test_default_is_idle() {
        let activity = Activity::default();
        assert_eq!(activity.status(), SessionStatus::Idle);
        assert!(!activity.is_typing());
        assert_eq!(activity.indicator(), Indicator::default());
    }

    #[test]
    fn test_request_round_trip() {
        let mut activity = Activity::default();
        activity.admit_request(OverlapPolicy::Exclusive).unwrap();
        activity.begin_request();
        assert_eq!(activity.status(), SessionStatus::AwaitingResponse);
        assert!(activity.is_typing());

        activity.end_request();
        assert_eq!(activity.status(), SessionStatus::Idle);
        assert!(!activity.is_typing());
    }

    #[test]
    fn test_second_request_rejected() {
        let mut activity = Activity::default();
        activity.begin_request();
        for policy in [OverlapPolicy::Exclusive, OverlapPolicy::AllowVoiceDuringResponse] {
            assert!(matches!(
                activity.admit_request(policy),
                Err(SessionError::RequestInFlight)
            ));
        }
    }

    #[test]
    fn test_capture_round_trip() {
        let mut activity = Activity::default();
        activity.admit_capture(OverlapPolicy::Exclusive).unwrap();
        activity.begin_opening_microphone();
        assert_eq!(activity.status(), SessionStatus::Idle);

        activity.finish_opening_microphone(true);
        assert_eq!(activity.status(), SessionStatus::Recording);

        activity.end_recording();
        assert_eq!(activity.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_failed_open_stays_idle() {
        let mut activity = Activity::default();
        activity.begin_opening_microphone();
        activity.finish_opening_microphone(false);
        assert_eq!(activity.status(), SessionStatus::Idle);
        assert!(activity.admit_capture(OverlapPolicy::Exclusive).is_ok());
    }

    #[test]
    fn test_capture_rejected_while_opening_or_recording() {
        let mut activity = Activity::default();
        activity.begin_opening_microphone();
        assert!(matches!(
            activity.admit_capture(OverlapPolicy::AllowVoiceDuringResponse),
            Err(SessionError::AlreadyRecording)
        ));

        activity.finish_opening_microphone(true);
        assert!(matches!(
            activity.admit_capture(OverlapPolicy::Exclusive),
            Err(SessionError::AlreadyRecording)
        ));
    }

    #[test]
    fn test_exclusive_policy_blocks_both_directions() {
        let mut awaiting = Activity::default();
        awaiting.begin_request();
        assert!(matches!(
            awaiting.admit_capture(OverlapPolicy::Exclusive),
            Err(SessionError::RequestInFlight)
        ));

        let mut recording = Activity::default();
        recording.begin_opening_microphone();
        recording.finish_opening_microphone(true);
        assert!(matches!(
            recording.admit_request(OverlapPolicy::Exclusive),
            Err(SessionError::RecordingInProgress)
        ));
    }

    #[test]
    fn test_overlap_policy_allows_both() {
        let mut activity = Activity::default();
        activity.begin_request();
        activity
            .admit_capture(OverlapPolicy::AllowVoiceDuringResponse)
            .unwrap();
        activity.begin_opening_microphone();
        activity.finish_opening_microphone(true);

        assert!(activity.is_awaiting_response());
        assert!(activity.is_recording());
        assert_eq!(activity.status(), SessionStatus::Recording);
        assert!(activity.indicator().typing);

        activity.end_request();
        assert_eq!(activity.status(), SessionStatus::Recording);
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(OverlapPolicy::from_flag(false), OverlapPolicy::Exclusive);
        assert_eq!(
            OverlapPolicy::from_flag(true),
            OverlapPolicy::AllowVoiceDuringResponse
        );
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Exclusive);
    }
}
