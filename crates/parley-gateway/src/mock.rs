//! Scripted gateway for tests and offline runs.
//!
//! Responses are queued per operation and consumed in order. Generation can
//! optionally be gated so a test can observe state while a request is still
//! outstanding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use parley_core::AudioPayload;

use crate::error::GatewayError;
use crate::InferenceGateway;

#[derive(Debug, Default)]
struct Script {
    generations: VecDeque<Result<String, GatewayError>>,
    transcriptions: VecDeque<Result<String, GatewayError>>,
    speech: VecDeque<Result<AudioPayload, GatewayError>>,
    prompts: Vec<String>,
    audio_uploads: Vec<AudioPayload>,
    speech_requests: Vec<String>,
}

/// Gateway that replays queued results.
///
/// Cloning shares the script, so a test can keep a handle for assertions
/// after handing the gateway to a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose generation calls block until [`release`](Self::release)
    /// lets them through.
    pub fn gated() -> Self {
        Self {
            script: Arc::default(),
            gate: Some(Arc::new(Semaphore::new(0))),
        }
    }

    /// Let `n` blocked or future generation calls complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn push_generation(&self, result: Result<String, GatewayError>) -> &Self {
        self.with_script(|s| s.generations.push_back(result));
        self
    }

    pub fn reply(&self, text: &str) -> &Self {
        self.push_generation(Ok(text.to_string()))
    }

    pub fn fail_generation(&self, status: u16) -> &Self {
        self.push_generation(Err(GatewayError::Status {
            status,
            body: "scripted failure".to_string(),
        }))
    }

    pub fn push_transcription(&self, result: Result<String, GatewayError>) -> &Self {
        self.with_script(|s| s.transcriptions.push_back(result));
        self
    }

    pub fn transcribe_as(&self, text: &str) -> &Self {
        self.push_transcription(Ok(text.to_string()))
    }

    pub fn push_speech(&self, result: Result<AudioPayload, GatewayError>) -> &Self {
        self.with_script(|s| s.speech.push_back(result));
        self
    }

    /// Prompts received by `generate_response`, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.with_script(|s| s.prompts.clone())
    }

    /// Audio payloads received by `speech_to_text`, in call order.
    pub fn audio_uploads(&self) -> Vec<AudioPayload> {
        self.with_script(|s| s.audio_uploads.clone())
    }

    /// Texts received by `text_to_speech`, in call order.
    pub fn speech_requests(&self) -> Vec<String> {
        self.with_script(|s| s.speech_requests.clone())
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut guard = match self.script.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn generate_response(&self, prompt: &str) -> Result<String, GatewayError> {
        self.with_script(|s| s.prompts.push(prompt.to_string()));

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            permit.forget();
        }

        self.with_script(|s| s.generations.pop_front())
            .unwrap_or(Err(GatewayError::Unscripted("generate_response")))
    }

    async fn speech_to_text(&self, audio: AudioPayload) -> Result<String, GatewayError> {
        self.with_script(|s| {
            s.audio_uploads.push(audio);
            s.transcriptions.pop_front()
        })
        .unwrap_or(Err(GatewayError::Unscripted("speech_to_text")))
    }

    async fn text_to_speech(&self, text: &str) -> Result<AudioPayload, GatewayError> {
        self.with_script(|s| {
            s.speech_requests.push(text.to_string());
            s.speech.pop_front()
        })
        .unwrap_or(Err(GatewayError::Unscripted("text_to_speech")))
    }
}
