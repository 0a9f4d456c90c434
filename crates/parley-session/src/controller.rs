//! The chat session controller.
//!
//! `ChatSession` owns the transcript, the draft input, and the activity flags
//! of a single conversation, and drives the inference gateway and microphone
//! on behalf of the user. Every operation restores the session to a
//! consistent state on success, failure, and cancellation alike: request
//! flags are cleared by a drop guard, and recordings release the microphone
//! when finished or dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_audio::{AudioError, Microphone, Recording};
use parley_core::config::SessionConfig;
use parley_core::{AudioPayload, Message, Sender};
use parley_gateway::{GatewayError, InferenceGateway};

use crate::error::SessionError;
use crate::state::{Activity, Indicator, OverlapPolicy, SessionStatus};
use crate::transcript::Transcript;

// =============================================================================
// Options and outcomes
// =============================================================================

/// Behavior knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Minimum time between a successful generation and its reply landing.
    pub reply_delay: Duration,
    /// Bot text appended when generation fails on the submit path.
    pub apology_text: String,
    /// Instruction prefixed to quoted text on correction requests.
    pub correction_instruction: String,
    pub overlap: OverlapPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            reply_delay: Duration::from_millis(config.reply_delay_ms),
            apology_text: config.apology_text.clone(),
            correction_instruction: config.correction_instruction.clone(),
            overlap: OverlapPolicy::from_flag(config.allow_voice_during_response),
        }
    }
}

/// How the bot side of a turn was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Text returned by the gateway.
    Generated,
    /// Generation failed and the apology was appended instead.
    Apology,
}

/// One completed submit: the user's message and the bot's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub prompt: Message,
    pub reply: Message,
    pub kind: ReplyKind,
}

/// Result of the transcription pipeline started by `stop_voice_capture`.
#[derive(Debug)]
pub enum VoiceOutcome {
    /// The transcription was sent as a message.
    Submitted(Turn),
    /// Nothing was recognized; the transcript and draft are untouched.
    Empty,
    /// The transcription landed in the draft but could not be sent.
    Rejected(SessionError),
    /// Speech recognition failed; nothing was changed.
    TranscriptionFailed(GatewayError),
}

// =============================================================================
// Session
// =============================================================================

struct SessionState {
    transcript: Transcript,
    draft: String,
    activity: Activity,
    recording: Option<Box<dyn Recording>>,
}

struct Inner {
    id: Uuid,
    gateway: Arc<dyn InferenceGateway>,
    microphone: Arc<dyn Microphone>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    indicator: watch::Sender<Indicator>,
}

impl Inner {
    /// The lock is never held across an await, so a poisoned guard still
    /// holds consistent data.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.indicator.send_replace(state.activity.indicator());
    }
}

/// Clears the request flags when a submit or correction ends, however it ends.
struct RequestGuard<'a> {
    inner: &'a Inner,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.activity.end_request();
        self.inner.publish(&state);
    }
}

/// Settles a microphone open attempt that did not produce a recording.
struct OpenGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.lock();
            state.activity.finish_opening_microphone(false);
            self.inner.publish(&state);
        }
    }
}

/// A single conversation with the bot.
///
/// Cheap to clone; clones share the same conversation.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("messages", &self.inner.lock().transcript.len())
            .finish()
    }
}

impl ChatSession {
    pub fn new(
        gateway: Arc<dyn InferenceGateway>,
        microphone: Arc<dyn Microphone>,
        options: SessionOptions,
    ) -> Self {
        let (indicator, _) = watch::channel(Indicator::default());
        let inner = Inner {
            id: Uuid::new_v4(),
            gateway,
            microphone,
            options,
            state: Mutex::new(SessionState {
                transcript: Transcript::new(),
                draft: String::new(),
                activity: Activity::default(),
                recording: None,
            }),
            indicator,
        };
        info!(session_id = %inner.id, overlap = ?inner.options.overlap, "Chat session created");
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn from_config(
        gateway: Arc<dyn InferenceGateway>,
        microphone: Arc<dyn Microphone>,
        config: &SessionConfig,
    ) -> Self {
        Self::new(gateway, microphone, SessionOptions::from(config))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Snapshot of every message so far, in order.
    pub fn transcript(&self) -> Vec<Message> {
        self.inner.lock().transcript.messages().to_vec()
    }

    pub fn draft(&self) -> String {
        self.inner.lock().draft.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().activity.status()
    }

    pub fn is_typing(&self) -> bool {
        self.inner.lock().activity.is_typing()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().activity.is_recording()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.inner.lock().activity.is_awaiting_response()
    }

    /// Watch status and typing indicator changes.
    pub fn subscribe(&self) -> watch::Receiver<Indicator> {
        self.inner.indicator.subscribe()
    }

    // -------------------------------------------------------------------------
    // Draft input
    // -------------------------------------------------------------------------

    pub fn set_draft(&self, text: impl Into<String>) {
        self.inner.lock().draft = text.into();
    }

    /// Append a glyph to the draft.
    pub fn insert_emoji(&self, glyph: &str) {
        self.inner.lock().draft.push_str(glyph);
    }

    /// Send whatever is in the draft.
    pub async fn submit_draft(&self) -> Result<Turn, SessionError> {
        let text = self.draft();
        self.submit(&text).await
    }

    /// Ask for a correction of the draft. The draft is left in place.
    pub async fn correct_draft(&self) -> Result<Option<Message>, SessionError> {
        let text = self.draft();
        self.request_correction(&text).await
    }

    // -------------------------------------------------------------------------
    // Text turns
    // -------------------------------------------------------------------------

    /// Send `text` as a user message and wait for the bot's reply.
    ///
    /// The user message is appended and the draft cleared before the gateway
    /// is called. A gateway failure is turned into the apology message, so
    /// the only errors returned are refusals: empty input, or another
    /// operation still in progress.
    pub async fn submit(&self, text: &str) -> Result<Turn, SessionError> {
        if text.trim().is_empty() {
            debug!(session_id = %self.inner.id, "Ignoring empty submit");
            return Err(SessionError::EmptyInput);
        }

        let prompt = {
            let mut state = self.inner.lock();
            state.activity.admit_request(self.inner.options.overlap)?;
            let prompt = state.transcript.append(Sender::User, text);
            state.draft.clear();
            state.activity.begin_request();
            self.inner.publish(&state);
            prompt
        };
        let _guard = RequestGuard { inner: &self.inner };
        info!(session_id = %self.inner.id, message_id = %prompt.id, "Message submitted");

        let (reply_text, kind) = match self.inner.gateway.generate_response(text).await {
            Ok(generated) => {
                tokio::time::sleep(self.inner.options.reply_delay).await;
                (generated, ReplyKind::Generated)
            }
            Err(e) => {
                warn!(
                    session_id = %self.inner.id,
                    error = %e,
                    "Generation failed; replying with apology"
                );
                (self.inner.options.apology_text.clone(), ReplyKind::Apology)
            }
        };

        let reply = self.inner.lock().transcript.append(Sender::Bot, reply_text);
        debug!(session_id = %self.inner.id, message_id = %reply.id, kind = ?kind, "Reply appended");
        Ok(Turn {
            prompt,
            reply,
            kind,
        })
    }

    /// Ask the bot to correct the grammar of `text`.
    ///
    /// Neither the text nor the request is added to the transcript; only a
    /// successful correction is, as a bot message. A gateway failure is logged
    /// and yields `Ok(None)`.
    pub async fn request_correction(&self, text: &str) -> Result<Option<Message>, SessionError> {
        if text.trim().is_empty() {
            debug!(session_id = %self.inner.id, "Ignoring empty correction request");
            return Err(SessionError::EmptyInput);
        }

        {
            let mut state = self.inner.lock();
            state.activity.admit_request(self.inner.options.overlap)?;
            state.activity.begin_request();
            self.inner.publish(&state);
        }
        let _guard = RequestGuard { inner: &self.inner };

        let prompt = correction_prompt(&self.inner.options.correction_instruction, text);
        match self.inner.gateway.generate_response(&prompt).await {
            Ok(result) => {
                let message = self
                    .inner
                    .lock()
                    .transcript
                    .append(Sender::Bot, correction_message(text, &result));
                info!(session_id = %self.inner.id, message_id = %message.id, "Correction appended");
                Ok(Some(message))
            }
            Err(e) => {
                error!(session_id = %self.inner.id, error = %e, "Error in grammar correction");
                Ok(None)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Voice turns
    // -------------------------------------------------------------------------

    /// Acquire the microphone and start buffering audio.
    ///
    /// On failure the session stays where it was and no device is held.
    pub async fn start_voice_capture(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.lock();
            state.activity.admit_capture(self.inner.options.overlap)?;
            state.activity.begin_opening_microphone();
        }
        let mut guard = OpenGuard {
            inner: &self.inner,
            armed: true,
        };

        let recording = match self.inner.microphone.open().await {
            Ok(recording) => recording,
            Err(e) => {
                if e.is_permission() {
                    warn!(session_id = %self.inner.id, error = %e, "Microphone access denied");
                } else {
                    error!(session_id = %self.inner.id, error = %e, "Error accessing microphone");
                }
                return Err(SessionError::Microphone(e));
            }
        };

        let recording_id = recording.id();
        {
            let mut state = self.inner.lock();
            state.recording = Some(recording);
            state.activity.finish_opening_microphone(true);
            self.inner.publish(&state);
        }
        guard.armed = false;
        info!(session_id = %self.inner.id, recording_id = %recording_id, "Voice capture started");
        Ok(())
    }

    /// Stop recording and hand the audio to speech recognition.
    ///
    /// The microphone is released and the status leaves `Recording` before
    /// this returns. Recognition runs on a spawned task; when it yields text
    /// that text is put in the draft and submitted. Await the returned handle
    /// to learn how the pipeline ended.
    pub async fn stop_voice_capture(&self) -> Result<JoinHandle<VoiceOutcome>, SessionError> {
        let recording = {
            let mut state = self.inner.lock();
            let recording = state.recording.take().ok_or(SessionError::NotRecording)?;
            state.activity.end_recording();
            self.inner.publish(&state);
            recording
        };
        let recording_id = recording.id();

        let payload = tokio::task::spawn_blocking(move || recording.finish())
            .await
            .map_err(|e| AudioError::Stream(format!("Recording finalize task failed: {}", e)))
            .and_then(|result| result)
            .map_err(|e| {
                error!(
                    session_id = %self.inner.id,
                    recording_id = %recording_id,
                    error = %e,
                    "Failed to finalize recording"
                );
                SessionError::Microphone(e)
            })?;
        info!(
            session_id = %self.inner.id,
            recording_id = %recording_id,
            bytes = payload.len(),
            "Voice capture stopped"
        );

        let session = self.clone();
        Ok(tokio::spawn(async move { session.transcribe(payload).await }))
    }

    async fn transcribe(&self, audio: AudioPayload) -> VoiceOutcome {
        match self.inner.gateway.speech_to_text(audio).await {
            Ok(text) => self.on_transcription_ready(&text).await,
            Err(e) => {
                error!(session_id = %self.inner.id, error = %e, "Error in speech to text");
                VoiceOutcome::TranscriptionFailed(e)
            }
        }
    }

    /// Handle recognized speech: stage it in the draft and send it.
    ///
    /// Blank text changes nothing. If the session is busy the text stays in
    /// the draft and the refusal is reported.
    pub async fn on_transcription_ready(&self, text: &str) -> VoiceOutcome {
        if text.trim().is_empty() {
            info!(session_id = %self.inner.id, "Transcription was empty; nothing to send");
            return VoiceOutcome::Empty;
        }

        self.set_draft(text);
        match self.submit(text).await {
            Ok(turn) => VoiceOutcome::Submitted(turn),
            Err(e) => {
                warn!(session_id = %self.inner.id, error = %e, "Transcribed text left in draft");
                VoiceOutcome::Rejected(e)
            }
        }
    }
}

/// Prompt sent to the generator for a correction request.
pub fn correction_prompt(instruction: &str, text: &str) -> String {
    format!("{} \"{}\"", instruction, text)
}

/// Bot message shown for a successful correction.
pub fn correction_message(text: &str, result: &str) -> String {
    format!("Correction for \"{}\": {}", text, result)
}

// =============================================================================
// Tests
// =============================================================================
