use std::io::Cursor;
use std::sync::Arc;

use hound::{SampleFormat, WavReader};

/// Channel count and rate an output stream has to be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

/// A synthesized utterance, decoded once and shared by every device.
///
/// Samples are interleaved and normalized to [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    format: StreamFormat,
    samples: Arc<[f32]>,
}

impl DecodedAudio {
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            format: StreamFormat { channels: channels.max(1), sample_rate },
            samples: samples.into(),
        }
    }

    /// Decodes an in-memory WAV container.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, hound::Error> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(Self::new(spec.channels, spec.sample_rate, samples))
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    /// Fixed-size chunks of `frames` frames each; the last one may be shorter.
    pub fn chunks(&self, frames: usize) -> std::slice::Chunks<'_, f32> {
        self.samples.chunks(frames.max(1) * self.format.channels as usize)
    }
}
