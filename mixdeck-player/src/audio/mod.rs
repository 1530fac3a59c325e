//! Audio I/O: storage access, WAV parsing and output sinks

pub mod output;
pub mod sink;
pub mod storage;
pub mod wav;

pub use output::CpalSink;
pub use sink::{AudioSink, NullSink, SinkFormat, WavFileSink};
pub use storage::{FsStorage, MediaSource, Storage};
pub use wav::{WavFormat, WavStream};
