//! # Mixdeck Player Library (mixdeck-player)
//!
//! Button-controlled WAV playback with a blendable second stream.
//!
//! **Purpose:** Stream 16-bit PCM from a WAV file on removable storage to an
//! audio sink, optionally averaging a second WAV stream into it, driven by two
//! debounced buttons (play/stop and mix on/off).
//!
//! **Architecture:** producer thread (WavStream ×2 → mixer) → bounded
//! overwrite-on-full hand-off → consumer thread → AudioSink; a tokio control
//! loop turns button edges into pipeline requests.

pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::{Pipeline, PipelineSettings, PipelineState};
