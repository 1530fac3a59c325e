//! Test helper modules for mixdeck-player integration tests
//!
//! - audio_generator: deterministic WAV fixtures written with hound
//! - recording_sink: AudioSink that records calls on a shared timeline
//! - test_storage: Storage wrapper that tracks open handles and injects read faults
#![allow(dead_code)]

pub mod audio_generator;
pub mod recording_sink;
pub mod test_storage;

pub use audio_generator::{ramp, write_wav, write_wav_with_spec, TEST_SAMPLE_RATE};
pub use recording_sink::{Recorder, RecordingSink, SinkBehaviour};
pub use test_storage::TrackingStorage;
