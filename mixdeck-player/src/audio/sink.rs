//! Audio sink collaborator
//!
//! The consumer thread owns the sink for the length of a session and drives
//! it as `start` → `write`* → `stop`. Implementations must be `Send` so they
//! can move onto that thread; anything that is not (a cpal stream, say) has to
//! live behind its own thread, see [`crate::audio::output::CpalSink`].

use crate::error::{Error, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Bytes per sample unit handed to [`AudioSink::write`]
pub const BYTES_PER_SAMPLE: usize = 2;

/// Stream parameters the sink is configured with at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl SinkFormat {
    /// Time it takes to play `samples` interleaved units at this format
    pub fn duration_of(&self, samples: usize) -> Duration {
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels.max(1));
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(samples as u64 * 1_000_000_000 / per_second)
    }
}

/// Audio output device
pub trait AudioSink: Send {
    /// Configure the device for a new session
    fn start(&mut self, format: SinkFormat) -> Result<()>;

    /// Present interleaved samples; returns the number of bytes accepted.
    ///
    /// Accepting fewer than `samples.len() * 2` bytes is a short write, which
    /// the caller treats as an underrun rather than an error.
    fn write(&mut self, samples: &[i16]) -> Result<usize>;

    /// Release the device at the end of a session
    fn stop(&mut self) -> Result<()>;

    /// Human readable name for logs
    fn name(&self) -> &str;
}

/// Sink that discards everything
///
/// With pacing enabled each write sleeps for the playing time of the block,
/// so producer and consumer run at the same rate they would against hardware.
#[derive(Debug, Default)]
pub struct NullSink {
    paced: bool,
    format: Option<SinkFormat>,
    /// Wall-clock deadline of the audio written so far
    clock: Option<Instant>,
    samples_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Null sink that consumes samples at real-time rate
    pub fn paced() -> Self {
        Self {
            paced: true,
            ..Self::default()
        }
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl AudioSink for NullSink {
    fn start(&mut self, format: SinkFormat) -> Result<()> {
        self.format = Some(format);
        self.clock = Some(Instant::now());
        self.samples_written = 0;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        let format = self
            .format
            .ok_or_else(|| Error::Sink("null sink written before start".to_string()))?;

        self.samples_written += samples.len() as u64;

        if self.paced {
            if let Some(clock) = self.clock.as_mut() {
                *clock += format.duration_of(samples.len());
                let now = Instant::now();
                if *clock > now {
                    std::thread::sleep(*clock - now);
                }
            }
        }

        Ok(samples.len() * BYTES_PER_SAMPLE)
    }

    fn stop(&mut self) -> Result<()> {
        debug!(samples = self.samples_written, "Null sink stopped");
        self.format = None;
        self.clock = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Sink that renders each session into a WAV file
///
/// Every session truncates and rewrites the file, so after a run it holds the
/// most recent session exactly as it would have reached the speaker.
pub struct WavFileSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for WavFileSink {
    fn start(&mut self, format: SinkFormat) -> Result<()> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(&self.path, spec).map_err(|e| {
            Error::Sink(format!("cannot create {}: {}", self.path.display(), e))
        })?;

        info!(
            path = %self.path.display(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Rendering session to WAV file"
        );
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Sink("WAV sink written before start".to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Sink(format!("write to {} failed: {}", self.path.display(), e)))?;
        }

        Ok(samples.len() * BYTES_PER_SAMPLE)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| Error::Sink(format!("finalize {} failed: {}", self.path.display(), e)))?;
            debug!(path = %self.path.display(), "WAV file finalized");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.stop();
        }
    }
}
