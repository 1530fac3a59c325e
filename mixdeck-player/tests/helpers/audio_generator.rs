//! WAV fixture generation
//!
//! Sample values are deterministic so tests can compare what reaches the sink
//! with what was written, sample for sample.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Fixture sample rate; low so fixtures stay small
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Write 16-bit PCM samples (interleaved when `channels > 1`)
pub fn write_wav<P: AsRef<Path>>(path: P, channels: u16, samples: &[i16]) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Write `frames` frames of silence in an arbitrary format (for rejection tests)
pub fn write_wav_with_spec<P: AsRef<Path>>(path: P, spec: WavSpec, frames: usize) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames * spec.channels as usize {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => writer.write_sample(0.0f32)?,
            (SampleFormat::Int, 8) => writer.write_sample(0i8)?,
            (SampleFormat::Int, 16) => writer.write_sample(0i16)?,
            (SampleFormat::Int, _) => writer.write_sample(0i32)?,
        }
    }
    writer.finalize()
}

/// `len` distinct, non-zero values: 1, 2, 3, ...
pub fn ramp(len: usize) -> Vec<i16> {
    (1..=len).map(|i| (i % i16::MAX as usize) as i16).collect()
}
