//! Real microphone capture via cpal.
//!
//! The cpal stream is not `Send` on every backend, so each recording owns a
//! dedicated capture thread that builds the stream, keeps it alive, and drops
//! it when told to stop. The callback only downmixes to mono; the whole
//! recording is resampled to the configured rate once, when it is finished.

use std::sync::mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_core::config::AudioConfig;
use parley_core::AudioPayload;

use crate::buffer::{downmix_to_mono, resample_linear, AudioBuffer};
use crate::error::AudioError;
use crate::wav::encode_wav;
use crate::{Microphone, Recording};

/// Microphone backed by the default cpal host.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    config: AudioConfig,
}

impl CpalMicrophone {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self) -> Result<Box<dyn Recording>, AudioError> {
        let config = self.config.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<Capture, AudioError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_config = config.clone();
        let handle = std::thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || capture_thread(thread_config, ready_tx, stop_rx))
            .map_err(|e| AudioError::Stream(format!("Failed to spawn capture thread: {}", e)))?;

        // Wait for the device to come up without blocking the runtime.
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| AudioError::Stream(format!("Capture startup task failed: {}", e)))?;

        match ready {
            Ok(Ok(capture)) => {
                let recording = CpalRecording {
                    id: Uuid::new_v4(),
                    started_at: Utc::now(),
                    buffer: capture.buffer,
                    device_rate: capture.device_rate,
                    sample_rate: config.sample_rate,
                    stop_tx: Some(stop_tx),
                    handle: Some(handle),
                };
                info!(
                    recording_id = %recording.id,
                    device = %config.device_name,
                    "Microphone recording started"
                );
                Ok(Box::new(recording))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Stream(
                    "Capture thread exited before the stream started".to_string(),
                ))
            }
        }
    }
}

/// What the capture thread hands back once its stream is running.
struct Capture {
    buffer: AudioBuffer,
    device_rate: u32,
}

fn capture_thread(
    config: AudioConfig,
    ready_tx: mpsc::SyncSender<Result<Capture, AudioError>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let (stream, capture) = match build_stream(&config) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::Stream(format!(
            "Failed to start audio stream: {}",
            e
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(capture));

    // Blocks until the recording is finished or dropped.
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Capture thread released the input device");
}

fn select_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    if device_name == "default" {
        return host.default_input_device().ok_or_else(|| {
            AudioError::DeviceUnavailable("No default input device found".into())
        });
    }
    let name_lower = device_name.to_lowercase();
    host.input_devices()
        .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&name_lower))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            AudioError::DeviceUnavailable(format!("Audio device '{}' not found", device_name))
        })
}

fn build_stream(config: &AudioConfig) -> Result<(cpal::Stream, Capture), AudioError> {
    let host = cpal::default_host();
    let device = select_device(&host, &config.device_name)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| classify_config_error(e.to_string()))?;
    let sample_format = supported.sample_format();
    let stream_config = supported.config();

    let device_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;
    info!(
        device = %device_name,
        device_rate,
        channels,
        target_rate = config.sample_rate,
        format = ?sample_format,
        "Using device's default input config"
    );

    // Sized in device-rate samples; resampling happens on finish.
    let buffer = AudioBuffer::for_duration(device_rate, config.max_recording_secs);
    let sink = buffer.clone();
    let stream = match sample_format {
        cpal::SampleFormat::F32 => input_stream::<f32>(&device, &stream_config, sink, channels),
        cpal::SampleFormat::I16 => input_stream::<i16>(&device, &stream_config, sink, channels),
        cpal::SampleFormat::U16 => input_stream::<u16>(&device, &stream_config, sink, channels),
        other => Err(AudioError::DeviceUnavailable(format!(
            "Unsupported sample format {:?}",
            other
        ))),
    }?;

    Ok((
        stream,
        Capture {
            buffer,
            device_rate,
        },
    ))
}

fn input_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    buffer: AudioBuffer,
    channels: u16,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data
                    .iter()
                    .map(|s| cpal::Sample::to_sample::<f32>(*s))
                    .collect();
                buffer.push(&downmix_to_mono(&floats, channels));
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable("Input device is no longer available".into())
            }
            other => classify_config_error(other.to_string()),
        })
}

/// Backends report denied access as a generic error string.
fn classify_config_error(message: String) -> AudioError {
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not authorized")
    {
        AudioError::PermissionDenied(message)
    } else {
        AudioError::DeviceUnavailable(message)
    }
}

/// Recording handle returned by [`CpalMicrophone`].
pub struct CpalRecording {
    id: Uuid,
    started_at: DateTime<Utc>,
    /// Mono samples at the device's native rate.
    buffer: AudioBuffer,
    device_rate: u32,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CpalRecording {
    fn release(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(recording_id = %self.id, "Capture thread panicked");
            }
        }
    }
}

impl Recording for CpalRecording {
    fn id(&self) -> Uuid {
        self.id
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn finish(mut self: Box<Self>) -> Result<AudioPayload, AudioError> {
        self.release();
        let captured = self.buffer.take();
        let samples = resample_linear(&captured, self.device_rate, self.sample_rate);
        info!(
            recording_id = %self.id,
            captured = captured.len(),
            samples = samples.len(),
            "Microphone recording finished"
        );
        encode_wav(&samples, self.sample_rate)
    }
}

impl Drop for CpalRecording {
    fn drop(&mut self) {
        self.release();
    }
}
