//! WAV encoding of captured PCM for upload to the speech recognizer.

use std::io::Cursor;

use parley_core::AudioPayload;

use crate::error::AudioError;

/// Encode mono f32 samples as a 16-bit PCM WAV payload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<AudioPayload, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }

    Ok(AudioPayload::wav(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header_and_length() {
        let samples = vec![0.0f32; 1600];
        let payload = encode_wav(&samples, 16000).unwrap();
        assert_eq!(payload.content_type, "audio/wav");
        assert_eq!(&payload.data[0..4], b"RIFF");
        assert_eq!(&payload.data[8..12], b"WAVE");
        assert_eq!(payload.len(), 44 + 1600 * 2);
    }

    #[test]
    fn test_encode_wav_clamps_and_reads_back() {
        let payload = encode_wav(&[2.0, -2.0, 0.5], 8000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(payload.data)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded[0], i16::MAX);
        assert_eq!(decoded[1], -i16::MAX);
        assert_eq!(decoded[2], (0.5 * i16::MAX as f32).round() as i16);
    }

    #[test]
    fn test_encode_empty_recording() {
        let payload = encode_wav(&[], 16000).unwrap();
        assert_eq!(payload.len(), 44);
    }
}
