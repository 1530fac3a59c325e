//! Shared playback flags
//!
//! The three flags are the only mutable state shared between the control
//! thread, the producer and the consumer. They stay private to the playback
//! module; everything outside sees [`PipelineState`] and goes through the
//! `Pipeline` request methods.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Externally visible pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No producer/consumer running
    Idle,
    /// Session active, primary only
    Playing,
    /// Session active with the mix stream blended in
    PlayingMixed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Playing => write!(f, "playing"),
            PipelineState::PlayingMixed => write!(f, "playing (mixed)"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PipelineFlags {
    playing: AtomicBool,
    mix_requested: AtomicBool,
    stop_requested: AtomicBool,
}

impl PipelineFlags {
    pub(crate) fn state(&self) -> PipelineState {
        match (self.is_playing(), self.is_mix_requested()) {
            (false, _) => PipelineState::Idle,
            (true, false) => PipelineState::Playing,
            (true, true) => PipelineState::PlayingMixed,
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub(crate) fn is_mix_requested(&self) -> bool {
        self.mix_requested.load(Ordering::Acquire)
    }

    /// Flip the mix request; returns the new value
    pub(crate) fn toggle_mix(&self) -> bool {
        !self.mix_requested.fetch_xor(true, Ordering::AcqRel)
    }

    /// Clear the mix request only if it is still set.
    ///
    /// Returns `false` when another thread already changed it, so a toggle
    /// that lands between the producer's read and this call is kept.
    pub(crate) fn clear_mix_if_set(&self) -> bool {
        self.mix_requested
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }
}
