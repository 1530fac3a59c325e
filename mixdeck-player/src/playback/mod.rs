//! Playback pipeline
//!
//! - [`mixer`]: per-sample blend of the primary and mix streams
//! - [`handoff`]: bounded overwrite-on-full queue between producer and consumer
//! - [`state`]: pipeline flags and the externally visible state
//! - [`pipeline`]: session start, producer/consumer threads, teardown

pub mod handoff;
pub mod mixer;
pub mod pipeline;
pub mod state;

pub use handoff::{AudioBlock, HandoffBuffer};
pub use pipeline::{Pipeline, PipelineSettings, SessionSummary};
pub use state::PipelineState;
