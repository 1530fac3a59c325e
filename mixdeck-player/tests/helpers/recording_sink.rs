//! AudioSink test double
//!
//! Every call is appended to a [`Recorder`] timeline shared with the storage
//! wrapper, so tests can assert cross-component ordering (sink stop before
//! file close).

use mixdeck_player::audio::sink::{AudioSink, SinkFormat};
use mixdeck_player::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared call log
#[derive(Debug, Default)]
pub struct Recorder {
    timeline: Mutex<Vec<String>>,
    blocks: Mutex<Vec<Vec<i16>>>,
    formats: Mutex<Vec<SinkFormat>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn note(&self, entry: impl Into<String>) {
        self.timeline.lock().unwrap().push(entry.into());
    }

    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    /// Position of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.timeline().iter().position(|e| e == entry)
    }

    /// Position of the last entry equal to `entry`
    pub fn last_position(&self, entry: &str) -> Option<usize> {
        self.timeline().iter().rposition(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.timeline().iter().filter(|e| *e == entry).count()
    }

    /// Blocks written, in arrival order
    pub fn blocks(&self) -> Vec<Vec<i16>> {
        self.blocks.lock().unwrap().clone()
    }

    /// All written samples concatenated
    pub fn samples(&self) -> Vec<i16> {
        self.blocks().concat()
    }

    pub fn formats(&self) -> Vec<SinkFormat> {
        self.formats.lock().unwrap().clone()
    }
}

/// How the sink misbehaves
#[derive(Debug, Clone, Default)]
pub struct SinkBehaviour {
    pub fail_start: bool,
    /// Accept only half of every write
    pub short_writes: bool,
    /// Fail the Nth write (0-based)
    pub fail_write_at: Option<usize>,
    /// Sleep in every write, to keep a session running
    pub write_delay: Option<Duration>,
}

pub struct RecordingSink {
    recorder: Arc<Recorder>,
    behaviour: SinkBehaviour,
    writes: usize,
}

impl RecordingSink {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self::with_behaviour(recorder, SinkBehaviour::default())
    }

    pub fn with_behaviour(recorder: Arc<Recorder>, behaviour: SinkBehaviour) -> Self {
        Self {
            recorder,
            behaviour,
            writes: 0,
        }
    }

    /// Slow sink so a session stays alive long enough to interact with it
    pub fn slow(recorder: Arc<Recorder>) -> Self {
        Self::with_behaviour(
            recorder,
            SinkBehaviour {
                write_delay: Some(Duration::from_millis(5)),
                ..SinkBehaviour::default()
            },
        )
    }
}

impl AudioSink for RecordingSink {
    fn start(&mut self, format: SinkFormat) -> Result<()> {
        if self.behaviour.fail_start {
            self.recorder.note("start-failed");
            return Err(Error::Sink("device busy".to_string()));
        }
        self.recorder.formats.lock().unwrap().push(format);
        self.recorder.note("start");
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        let index = self.writes;
        self.writes += 1;

        if let Some(delay) = self.behaviour.write_delay {
            std::thread::sleep(delay);
        }
        if self.behaviour.fail_write_at == Some(index) {
            self.recorder.note("write-failed");
            return Err(Error::Sink("device unplugged".to_string()));
        }

        self.recorder.blocks.lock().unwrap().push(samples.to_vec());
        self.recorder.note("write");

        let bytes = samples.len() * 2;
        Ok(if self.behaviour.short_writes { bytes / 2 } else { bytes })
    }

    fn stop(&mut self) -> Result<()> {
        self.recorder.note("stop");
        self.writes = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
