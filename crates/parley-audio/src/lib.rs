//! Parley audio crate - microphone acquisition and recording lifecycle.
//!
//! A `Microphone` hands out exclusive `Recording` handles. A recording buffers
//! PCM until it is finished into a single WAV `AudioPayload`. Dropping a
//! recording without finishing it releases the device as well, so every
//! failure path gives the microphone back.
//!
//! Includes a mock implementation for running the voice path without real
//! audio hardware, and a cpal backend behind the `cpal` feature.

pub mod buffer;
#[cfg(feature = "cpal")]
pub mod cpal_microphone;
pub mod error;
pub mod wav;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use parley_core::AudioPayload;

pub use buffer::AudioBuffer;
#[cfg(feature = "cpal")]
pub use cpal_microphone::CpalMicrophone;
pub use error::AudioError;
pub use wav::encode_wav;

// =============================================================================
// Traits
// =============================================================================

/// Source of exclusive audio input streams.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Acquire the input device and start buffering audio.
    ///
    /// Fails with `AudioError::PermissionDenied` when access is refused and
    /// `AudioError::DeviceUnavailable` when no usable device exists.
    async fn open(&self) -> Result<Box<dyn Recording>, AudioError>;
}

/// An in-progress recording holding the input device.
///
/// Dropping the handle stops the stream and releases the device.
pub trait Recording: Send {
    fn id(&self) -> Uuid;

    fn started_at(&self) -> DateTime<Utc>;

    /// Stop capture, release the device, and encode the buffered audio.
    fn finish(self: Box<Self>) -> Result<AudioPayload, AudioError>;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// How the mock microphone responds to `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAccess {
    Granted,
    Denied,
    NoDevice,
}

/// Mock microphone for tests and headless runs.
///
/// Every recording "captures" the configured samples. Tracks how many
/// streams were opened and how many are still held so callers can assert
/// that the device is acquired once and always released.
#[derive(Debug, Clone)]
pub struct MockMicrophone {
    access: Arc<Mutex<MockAccess>>,
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    opened: Arc<AtomicUsize>,
    held: Arc<AtomicUsize>,
    fail_finish: Arc<AtomicBool>,
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMicrophone {
    /// A granted microphone producing a short burst of tone.
    pub fn new() -> Self {
        let samples = (0..1600).map(|i| ((i as f32) * 0.05).sin() * 0.3).collect();
        Self::with_samples(samples, 16000)
    }

    pub fn with_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            access: Arc::new(Mutex::new(MockAccess::Granted)),
            samples: Arc::new(samples),
            sample_rate,
            opened: Arc::new(AtomicUsize::new(0)),
            held: Arc::new(AtomicUsize::new(0)),
            fail_finish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A microphone whose access the OS refuses.
    pub fn denied() -> Self {
        let mic = Self::new();
        mic.set_access(MockAccess::Denied);
        mic
    }

    pub fn set_access(&self, access: MockAccess) {
        if let Ok(mut guard) = self.access.lock() {
            *guard = access;
        }
    }

    /// Make the next finished recordings fail to encode.
    pub fn fail_on_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }

    /// Number of streams successfully opened so far.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of streams currently holding the device.
    pub fn held_count(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for MockMicrophone {
    async fn open(&self) -> Result<Box<dyn Recording>, AudioError> {
        let access = self
            .access
            .lock()
            .map(|a| *a)
            .map_err(|e| AudioError::Stream(format!("mock access lock poisoned: {}", e)))?;
        match access {
            MockAccess::Denied => {
                return Err(AudioError::PermissionDenied(
                    "mock microphone access denied".to_string(),
                ))
            }
            MockAccess::NoDevice => {
                return Err(AudioError::DeviceUnavailable(
                    "mock microphone has no input device".to_string(),
                ))
            }
            MockAccess::Granted => {}
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.held.fetch_add(1, Ordering::SeqCst);

        let buffer = AudioBuffer::new(self.samples.len().max(1));
        buffer.push(&self.samples);

        let recording = MockRecording {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            buffer,
            sample_rate: self.sample_rate,
            held: Arc::clone(&self.held),
            fail_finish: self.fail_finish.load(Ordering::SeqCst),
            released: false,
        };
        tracing::info!(recording_id = %recording.id, "Mock microphone opened");
        Ok(Box::new(recording))
    }
}

/// Recording handle returned by [`MockMicrophone`].
#[derive(Debug)]
pub struct MockRecording {
    id: Uuid,
    started_at: DateTime<Utc>,
    buffer: AudioBuffer,
    sample_rate: u32,
    held: Arc<AtomicUsize>,
    fail_finish: bool,
    released: bool,
}

impl MockRecording {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.held.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(recording_id = %self.id, "Mock microphone released");
        }
    }
}

impl Recording for MockRecording {
    fn id(&self) -> Uuid {
        self.id
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn finish(mut self: Box<Self>) -> Result<AudioPayload, AudioError> {
        self.release();
        if self.fail_finish {
            return Err(AudioError::Encoding(
                "mock recording failed to finalize".to_string(),
            ));
        }
        encode_wav(&self.buffer.take(), self.sample_rate)
    }
}

impl Drop for MockRecording {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
