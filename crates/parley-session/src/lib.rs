//! Parley session crate - the conversation controller.
//!
//! A `ChatSession` holds the transcript, the draft input, and the session
//! status, and is the only thing that mutates them. Text turns go straight
//! to the inference gateway; voice turns go microphone -> WAV payload ->
//! speech recognition -> draft -> submit. Status is derived from activity
//! flags and published on a watch channel for the typing indicator.

pub mod controller;
pub mod error;
pub mod state;
pub mod transcript;

pub use controller::{ChatSession, ReplyKind, SessionOptions, Turn, VoiceOutcome};
pub use error::SessionError;
pub use state::{Indicator, OverlapPolicy, SessionStatus};
pub use transcript::Transcript;
