//! Playback pipeline: session lifecycle, producer and consumer
//!
//! One session is one Idle → Playing → Idle lifetime. Starting a session opens
//! the primary stream (and the mix stream if requested), starts the sink, and
//! spawns two threads:
//!
//! ```text
//! producer: WavStream(primary) ─┐
//!                               ├─ mix() ─> HandoffBuffer ─> consumer ─> AudioSink
//!           WavStream(mix)    ──┘
//! ```
//!
//! The producer owns every per-session resource through [`Session`]. When its
//! loop ends (stop request, end of stream, read failure, sink fault) dropping
//! the session tears everything down in a fixed order: close the hand-off,
//! join the consumer, stop the sink, then release the file handles. The
//! `playing` flag is cleared last, so `playing == true` exactly while a
//! producer/consumer pair exists.

use crate::audio::sink::{AudioSink, SinkFormat, BYTES_PER_SAMPLE};
use crate::audio::storage::{MediaSource, Storage};
use crate::audio::wav::WavStream;
use crate::control::IntentHandler;
use crate::error::{Error, Result};
use crate::playback::handoff::{AudioBlock, HandoffBuffer};
use crate::playback::mixer::mix;
use crate::playback::state::{PipelineFlags, PipelineState};
use chrono::Utc;
use mixdeck_common::events::{ControlIntent, EventBus, PlayerEvent, SessionEndReason};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Short writes logged at `warn!`: the first, then every Nth
const SHORT_WRITE_LOG_INTERVAL: u64 = 100;

type Stream = WavStream<Box<dyn MediaSource>>;

/// Static pipeline parameters
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Primary stream, relative to the storage root
    pub primary_file: PathBuf,
    /// Stream blended in while mix is active
    pub mix_file: PathBuf,
    /// Samples per hand-off block
    pub block_samples: usize,
    /// Hand-off capacity in blocks
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            primary_file: PathBuf::from("gong.wav"),
            mix_file: PathBuf::from("huh.wav"),
            block_samples: 1024,
            queue_capacity: 20,
        }
    }
}

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub reason: SessionEndReason,
    /// Blocks generated by the producer
    pub blocks_produced: u64,
    /// Blocks written to the sink
    pub blocks_delivered: u64,
    /// Pending blocks evicted by overwrite-on-full
    pub overwritten_blocks: u64,
    /// Sink writes that accepted fewer bytes than offered
    pub short_writes: u64,
}

/// State shared by the pipeline handle and its worker threads
struct Shared {
    settings: PipelineSettings,
    storage: Arc<dyn Storage>,
    flags: PipelineFlags,
    handoff: HandoffBuffer,
    /// The sink stays in this slot; the consumer holds the lock for the
    /// length of a session.
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    events: EventBus,
}

impl Shared {
    fn sink_slot(&self) -> MutexGuard<'_, Option<Box<dyn AudioSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_stream(&self, path: &Path) -> Result<Stream> {
        let source = self.storage.open(path)?;
        WavStream::open(source)
    }
}

struct SessionHandle {
    id: Uuid,
    producer: JoinHandle<SessionSummary>,
}

/// Button-driven playback pipeline
///
/// All methods take `&self`; the pipeline is shared behind an `Arc` between
/// the control loop and shutdown handling.
pub struct Pipeline {
    shared: Arc<Shared>,
    session: Mutex<Option<SessionHandle>>,
}

impl Pipeline {
    /// Build an idle pipeline.
    ///
    /// # Errors
    /// [`Error::Config`] if the block size or queue capacity is zero.
    pub fn new(
        settings: PipelineSettings,
        storage: Arc<dyn Storage>,
        sink: Box<dyn AudioSink>,
        events: EventBus,
    ) -> Result<Self> {
        if settings.block_samples == 0 {
            return Err(Error::Config("block_samples must be at least 1".to_string()));
        }
        if settings.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }

        info!(
            primary = %settings.primary_file.display(),
            mix = %settings.mix_file.display(),
            block_samples = settings.block_samples,
            queue_capacity = settings.queue_capacity,
            sink = sink.name(),
            "Pipeline ready"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                handoff: HandoffBuffer::new(settings.queue_capacity),
                settings,
                storage,
                flags: PipelineFlags::default(),
                sink: Mutex::new(Some(sink)),
                events,
            }),
            session: Mutex::new(None),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.shared.flags.state()
    }

    pub fn is_mix_requested(&self) -> bool {
        self.shared.flags.is_mix_requested()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session when idle; stop the running one otherwise.
    ///
    /// Stopping waits for teardown to complete, so the returned state is
    /// `Idle`. A session that fails to start is logged and published as
    /// [`PlayerEvent::SessionStartFailed`], and the pipeline stays idle.
    pub fn request_toggle_play(&self) -> PipelineState {
        let mut slot = self.session_slot();

        if self.shared.flags.is_playing() {
            info!("Stop requested");
            self.shared.flags.request_stop();
            join_session(slot.take());
            return self.state();
        }

        // A session that ended on its own is reaped here
        join_session(slot.take());

        match self.start_session() {
            Ok(handle) => {
                debug!(session_id = %handle.id, "Session running");
                *slot = Some(handle);
            }
            Err(e) => {
                let file = self.shared.settings.primary_file.display().to_string();
                error!(file = %file, error = %e, "Failed to start playback");
                self.shared.events.emit_lossy(PlayerEvent::SessionStartFailed {
                    file,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        self.state()
    }

    /// Flip the mix request without restarting the session.
    ///
    /// While idle this only records the preference for the next start.
    pub fn request_toggle_mix(&self) -> PipelineState {
        let active = self.shared.flags.toggle_mix();
        info!(active, "Mix toggled");
        self.shared.events.emit_lossy(PlayerEvent::MixChanged {
            active,
            timestamp: Utc::now(),
        });
        self.state()
    }

    /// Block until the current session (if any) has ended on its own.
    pub fn wait_until_idle(&self) -> Option<SessionSummary> {
        let handle = self.session_slot().take();
        join_session(handle)
    }

    /// Stop any running session and wait for its teardown
    pub fn shutdown(&self) -> Option<SessionSummary> {
        let handle = {
            let mut slot = self.session_slot();
            if self.shared.flags.is_playing() {
                self.shared.flags.request_stop();
            }
            slot.take()
        };
        let summary = join_session(handle);
        info!("Pipeline shut down");
        summary
    }

    /// Idle → Playing
    fn start_session(&self) -> Result<SessionHandle> {
        let shared = &self.shared;
        let settings = &shared.settings;

        let primary = shared.open_stream(&settings.primary_file)?;
        info!(
            file = %settings.primary_file.display(),
            sample_rate = primary.sample_rate(),
            channels = primary.channels(),
            "Opened primary stream"
        );

        let secondary = if shared.flags.is_mix_requested() {
            open_mix_stream(shared, &primary)
        } else {
            None
        };

        let primary_buf = allocate_block(settings.block_samples)?;
        let secondary_buf = allocate_block(settings.block_samples)?;

        let format = SinkFormat {
            sample_rate: primary.sample_rate(),
            channels: primary.channels(),
        };
        {
            let mut slot = shared.sink_slot();
            let sink = slot
                .as_mut()
                .ok_or_else(|| Error::InvalidState("audio sink unavailable".to_string()))?;
            sink.start(format)?;
        }

        shared.handoff.reset();
        shared.flags.clear_stop();
        shared.flags.set_playing(true);

        let id = Uuid::new_v4();

        // From here on the session value owns the teardown
        let flag_guard = PlayingFlagGuard {
            shared: Arc::clone(shared),
        };
        let consumer = ConsumerGuard::spawn(Arc::clone(shared))?;
        let session = Session {
            consumer,
            id,
            primary,
            secondary,
            primary_buf,
            secondary_buf,
        };

        let thread_shared = Arc::clone(shared);
        let producer = thread::Builder::new()
            .name("mixdeck-producer".to_string())
            .spawn(move || run_producer(thread_shared, session, flag_guard))
            .map_err(|e| Error::ResourceExhausted(format!("producer thread: {}", e)))?;

        Ok(SessionHandle { id, producer })
    }
}

impl IntentHandler for Pipeline {
    fn handle_intent(&self, intent: ControlIntent) {
        let state = match intent {
            ControlIntent::TogglePlay => self.request_toggle_play(),
            ControlIntent::ToggleMix => self.request_toggle_mix(),
        };
        debug!(%intent, %state, "Intent handled");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let handle = {
            let mut slot = self.session_slot();
            if slot.is_some() {
                self.shared.flags.request_stop();
            }
            slot.take()
        };
        join_session(handle);
    }
}

fn join_session(handle: Option<SessionHandle>) -> Option<SessionSummary> {
    let handle = handle?;
    match handle.producer.join() {
        Ok(summary) => Some(summary),
        Err(_) => {
            error!(session_id = %handle.id, "Producer thread panicked");
            None
        }
    }
}

fn allocate_block(samples: usize) -> Result<Vec<i16>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(samples).map_err(|e| {
        Error::ResourceExhausted(format!("sample buffer of {} samples: {}", samples, e))
    })?;
    buf.resize(samples, 0);
    Ok(buf)
}

/// Open the mix stream; on failure clear the request and carry on without it
fn open_mix_stream(shared: &Shared, primary: &Stream) -> Option<Stream> {
    let path = &shared.settings.mix_file;
    match shared.open_stream(path) {
        Ok(stream) => {
            if stream.sample_rate() != primary.sample_rate()
                || stream.channels() != primary.channels()
            {
                warn!(
                    file = %path.display(),
                    mix_rate = stream.sample_rate(),
                    mix_channels = stream.channels(),
                    primary_rate = primary.sample_rate(),
                    primary_channels = primary.channels(),
                    "Mix stream format differs from primary, blending unconverted"
                );
            }
            debug!(file = %path.display(), "Opened mix stream");
            Some(stream)
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Cannot open mix stream, continuing without mix");
            if shared.flags.clear_mix_if_set() {
                shared.events.emit_lossy(PlayerEvent::MixChanged {
                    active: false,
                    timestamp: Utc::now(),
                });
            }
            None
        }
    }
}

/// Per-session resources, owned by the producer thread.
///
/// Field order is teardown order: the consumer guard (sink stop) drops before
/// the streams (file handles).
struct Session {
    consumer: ConsumerGuard,
    id: Uuid,
    primary: Stream,
    secondary: Option<Stream>,
    primary_buf: Vec<i16>,
    secondary_buf: Vec<i16>,
}

/// Clears `stop_requested` and `playing` when the producer exits, however it exits
struct PlayingFlagGuard {
    shared: Arc<Shared>,
}

impl Drop for PlayingFlagGuard {
    fn drop(&mut self) {
        self.shared.flags.clear_stop();
        self.shared.flags.set_playing(false);
    }
}

#[derive(Debug, Default)]
struct ConsumerReport {
    blocks_written: u64,
    short_writes: u64,
    fault: Option<String>,
}

/// Owns the consumer thread and stops the sink after it exits
struct ConsumerGuard {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<ConsumerReport>>,
}

impl ConsumerGuard {
    fn spawn(shared: Arc<Shared>) -> Result<Self> {
        let thread_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("mixdeck-consumer".to_string())
            .spawn(move || run_consumer(thread_shared));

        match spawned {
            Ok(handle) => Ok(Self {
                shared,
                handle: Some(handle),
            }),
            Err(e) => {
                stop_sink(&shared);
                Err(Error::ResourceExhausted(format!("consumer thread: {}", e)))
            }
        }
    }

    /// Close the hand-off, join the consumer and stop the sink.
    ///
    /// With `discard_pending` the queued blocks are dropped instead of
    /// drained. Runs at most once; later calls return an empty report.
    fn finish(&mut self, discard_pending: bool) -> ConsumerReport {
        let Some(handle) = self.handle.take() else {
            return ConsumerReport::default();
        };

        if discard_pending {
            let dropped = self.shared.handoff.discard_and_close();
            if dropped > 0 {
                debug!(dropped, "Discarded pending blocks");
            }
        } else {
            self.shared.handoff.close();
        }

        let report = handle.join().unwrap_or_else(|_| {
            error!("Consumer thread panicked");
            ConsumerReport {
                fault: Some("consumer thread panicked".to_string()),
                ..ConsumerReport::default()
            }
        });

        stop_sink(&self.shared);
        report
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.finish(true);
    }
}

fn stop_sink(shared: &Shared) {
    if let Some(sink) = shared.sink_slot().as_mut() {
        if let Err(e) = sink.stop() {
            error!(sink = sink.name(), error = %e, "Failed to stop audio sink");
        }
    }
}

fn run_consumer(shared: Arc<Shared>) -> ConsumerReport {
    let mut report = ConsumerReport::default();
    let mut slot = shared.sink_slot();
    let Some(sink) = slot.as_mut() else {
        shared.flags.request_stop();
        report.fault = Some("audio sink unavailable".to_string());
        return report;
    };

    loop {
        if shared.flags.is_stop_requested() {
            break;
        }
        let Some(block) = shared.handoff.pop() else {
            break;
        };

        let offered = block.samples.len() * BYTES_PER_SAMPLE;
        match sink.write(&block.samples) {
            Ok(written) => {
                report.blocks_written += 1;
                if written < offered {
                    report.short_writes += 1;
                    let count = report.short_writes;
                    if count == 1 || count % SHORT_WRITE_LOG_INTERVAL == 0 {
                        warn!(seq = block.seq, offered, written, total = count, "Sink short write (underrun)");
                    } else {
                        trace!(seq = block.seq, offered, written, total = count, "Sink short write (underrun)");
                    }
                }
            }
            Err(e) => {
                error!(sink = sink.name(), seq = block.seq, error = %e, "Sink write failed, ending session");
                report.fault = Some(e.to_string());
                shared.flags.request_stop();
                break;
            }
        }
    }

    report
}

fn run_producer(shared: Arc<Shared>, session: Session, flag_guard: PlayingFlagGuard) -> SessionSummary {
    let mut session = session;
    let flags = &shared.flags;
    let block_samples = shared.settings.block_samples;
    let mut seq: u64 = 0;

    let mixing = session.secondary.is_some() && flags.is_mix_requested();
    info!(
        session_id = %session.id,
        file = %shared.settings.primary_file.display(),
        sample_rate = session.primary.sample_rate(),
        mixing,
        "Playback started"
    );
    shared.events.emit_lossy(PlayerEvent::SessionStarted {
        session_id: session.id,
        primary_file: shared.settings.primary_file.display().to_string(),
        sample_rate: session.primary.sample_rate(),
        channels: session.primary.channels(),
        mixing,
        timestamp: Utc::now(),
    });

    let mut reason = loop {
        if flags.is_stop_requested() {
            break SessionEndReason::StopRequested;
        }

        let n = match session.primary.read(&mut session.primary_buf, block_samples) {
            Ok(0) => break SessionEndReason::EndOfStream,
            Ok(n) => n,
            Err(e) => {
                error!(
                    file = %shared.settings.primary_file.display(),
                    error = %e,
                    "Primary stream read failed, ending session"
                );
                break SessionEndReason::StorageError;
            }
        };

        let mut secondary_len = 0;
        let mut blend = false;

        if flags.is_mix_requested() {
            if session.secondary.is_none() {
                session.secondary = open_mix_stream(&shared, &session.primary);
            }

            let mut drop_secondary = false;
            if let Some(secondary) = session.secondary.as_mut() {
                match secondary.read(&mut session.secondary_buf, n) {
                    Ok(m) => {
                        blend = true;
                        secondary_len = m;
                        if m < n {
                            info!(session_id = %session.id, "Mix stream exhausted, rewinding");
                            let cleared = flags.clear_mix_if_set();
                            shared.events.emit_lossy(PlayerEvent::MixExhausted {
                                session_id: session.id,
                                timestamp: Utc::now(),
                            });
                            if cleared {
                                shared.events.emit_lossy(PlayerEvent::MixChanged {
                                    active: false,
                                    timestamp: Utc::now(),
                                });
                            }
                            if let Err(e) = secondary.reset_to_start() {
                                warn!(error = %e, "Mix stream rewind failed, closing it");
                                drop_secondary = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            file = %shared.settings.mix_file.display(),
                            error = %e,
                            "Mix stream read failed, continuing without mix"
                        );
                        if flags.clear_mix_if_set() {
                            shared.events.emit_lossy(PlayerEvent::MixChanged {
                                active: false,
                                timestamp: Utc::now(),
                            });
                        }
                        drop_secondary = true;
                    }
                }
            }
            if drop_secondary {
                session.secondary = None;
            }
        }

        let secondary = blend.then(|| &session.secondary_buf[..secondary_len]);
        let samples = mix(&session.primary_buf[..n], secondary, secondary_len);

        trace!(seq, samples = n, mixed = secondary_len, "Block produced");
        shared.handoff.push(AudioBlock { seq, samples });
        seq += 1;
    };

    // A user stop drops what is queued; a natural end plays it out
    let discard = reason != SessionEndReason::EndOfStream;
    let report = session.consumer.finish(discard);
    if let Some(fault) = &report.fault {
        debug!(fault = %fault, "Consumer ended with a fault");
        reason = SessionEndReason::SinkError;
    }

    let summary = SessionSummary {
        session_id: session.id,
        reason,
        blocks_produced: seq,
        blocks_delivered: report.blocks_written,
        overwritten_blocks: shared.handoff.overwrites(),
        short_writes: report.short_writes,
    };

    // Streams close after the sink has stopped
    drop(session);
    drop(flag_guard);

    info!(
        session_id = %summary.session_id,
        reason = %summary.reason,
        blocks_delivered = summary.blocks_delivered,
        overwritten = summary.overwritten_blocks,
        short_writes = summary.short_writes,
        "Playback ended"
    );
    shared.events.emit_lossy(PlayerEvent::SessionEnded {
        session_id: summary.session_id,
        reason: summary.reason,
        blocks_delivered: summary.blocks_delivered,
        overwritten_blocks: summary.overwritten_blocks,
        short_writes: summary.short_writes,
        timestamp: Utc::now(),
    });

    summary
}
