//! Sample buffering and format conversion for recordings.

use std::sync::{Arc, Mutex};

/// Thread-safe capped buffer for mono f32 PCM samples.
///
/// Filled from the capture callback thread and drained once when the
/// recording is finalized. When full, the oldest samples are dropped.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
    max_samples: usize,
}

impl AudioBuffer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::new())),
            max_samples,
        }
    }

    /// Buffer sized for `secs` seconds of mono audio at `sample_rate`.
    pub fn for_duration(sample_rate: u32, secs: u32) -> Self {
        Self::new(sample_rate as usize * secs.max(1) as usize)
    }

    /// Push samples into the buffer. Drops oldest samples if the buffer is full.
    pub fn push(&self, data: &[f32]) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.extend_from_slice(data);
            if buf.len() > self.max_samples {
                let excess = buf.len() - self.max_samples;
                buf.drain(..excess);
            }
        }
    }

    /// Take all buffered samples, leaving the buffer empty.
    pub fn take(&self) -> Vec<f32> {
        if let Ok(mut buf) = self.samples.lock() {
            std::mem::take(&mut *buf)
        } else {
            Vec::new()
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Average interleaved frames down to a single channel.
pub fn downmix_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for speech recognition input.
pub fn resample_linear(mono: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || mono.is_empty() || from_rate == 0 || to_rate == 0 {
        return mono.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (mono.len() as f64 / ratio).ceil() as usize;
    let last = mono.len() - 1;
    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx0 = (src.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (src - idx0 as f64) as f32;
            mono[idx0] * (1.0 - frac) + mono[idx1] * frac
        })
        .collect()
}
