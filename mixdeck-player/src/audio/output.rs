//! Audio device output via cpal
//!
//! `cpal::Stream` is not `Send`, so it cannot travel with the sink onto the
//! consumer thread. Each session therefore spawns a small output thread that
//! builds, plays and finally drops the stream; the sink keeps only the
//! producer half of a lock-free ring that the device callback drains.
//!
//! ```text
//! consumer thread ──write()──> HeapProd<i16> ══ring══> HeapCons<i16> ──callback──> device
//!                                                      (owned by output thread's stream)
//! ```

use crate::audio::sink::{AudioSink, SinkFormat, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Ring length expressed as playing time
const RING_DURATION_MS: u64 = 200;

/// Sleep between attempts while the ring is full
const WRITE_BACKOFF: Duration = Duration::from_millis(1);

/// List available audio output devices.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Sink(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Pick the named device, falling back to the host default
fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::Sink(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(dev);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let dev = host
        .default_output_device()
        .ok_or_else(|| Error::Sink("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        dev.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(dev)
}

/// Per-session output resources
struct ActiveOutput {
    producer: HeapProd<i16>,
    format: SinkFormat,
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    /// Set by the stream error callback
    failed: Arc<AtomicBool>,
    /// Callback periods that found the ring empty
    underruns: Arc<AtomicU64>,
}

/// Sink writing to a physical audio device
pub struct CpalSink {
    device_name: Option<String>,
    write_timeout: Duration,
    active: Option<ActiveOutput>,
}

impl CpalSink {
    /// `write_timeout` bounds how long a write waits for ring space before
    /// returning a short write.
    pub fn new(device_name: Option<String>, write_timeout: Duration) -> Self {
        Self {
            device_name,
            write_timeout,
            active: None,
        }
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, format: SinkFormat) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::InvalidState("output already started".to_string()));
        }

        let ring_len = (format.sample_rate as u64 * format.channels as u64 * RING_DURATION_MS
            / 1000)
            .max(1) as usize;
        let (producer, consumer) = HeapRb::<i16>::new(ring_len).split();

        let failed = Arc::new(AtomicBool::new(false));
        let underruns = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let thread_failed = Arc::clone(&failed);
        let thread_underruns = Arc::clone(&underruns);

        let thread = thread::Builder::new()
            .name("mixdeck-output".to_string())
            .spawn(move || {
                let stream = match open_stream(
                    device_name.as_deref(),
                    format,
                    consumer,
                    thread_failed,
                    thread_underruns,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Sink(format!("Failed to start stream: {}", e))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Hold the stream until stop() (or the sink is dropped)
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Output stream closed");
            })
            .map_err(|e| Error::ResourceExhausted(format!("output thread: {}", e)))?;

        let started = ready_rx
            .recv()
            .map_err(|_| Error::Sink("output thread exited during start".to_string()))
            .and_then(|r| r);

        if let Err(e) = started {
            let _ = thread.join();
            return Err(e);
        }

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            ring_len,
            "Audio output started"
        );

        self.active = Some(ActiveOutput {
            producer,
            format,
            stop_tx,
            thread: Some(thread),
            failed,
            underruns,
        });
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::Sink("audio output written before start".to_string()))?;

        let deadline = Instant::now() + self.write_timeout;
        let mut written = 0;

        while written < samples.len() {
            if active.failed.load(Ordering::Acquire) {
                return Err(Error::Sink("audio stream reported an error".to_string()));
            }

            written += active.producer.push_slice(&samples[written..]);
            if written == samples.len() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(WRITE_BACKOFF);
        }

        Ok(written * BYTES_PER_SAMPLE)
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        // Let the device play out what is already queued
        let drain_deadline =
            Instant::now() + active.format.duration_of(active.producer.capacity().get());
        while !active.producer.is_empty()
            && Instant::now() < drain_deadline
            && !active.failed.load(Ordering::Acquire)
        {
            thread::sleep(WRITE_BACKOFF);
        }

        let _ = active.stop_tx.send(());
        if let Some(thread) = active.thread.take() {
            thread
                .join()
                .map_err(|_| Error::Sink("output thread panicked".to_string()))?;
        }

        info!(
            underruns = active.underruns.load(Ordering::Relaxed),
            "Audio output stopped"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default")
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.stop();
        }
    }
}

/// Build the device stream for `format`; runs on the output thread
fn open_stream(
    device_name: Option<&str>,
    format: SinkFormat,
    mut consumer: HeapCons<i16>,
    failed: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
) -> Result<Stream> {
    let device = select_device(device_name)?;

    let sample_format = device
        .default_output_config()
        .map_err(|e| Error::Sink(format!("Failed to get default output config: {}", e)))?
        .sample_format();

    // No resampling: the device runs at the file's rate or the session fails
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let error_callback = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        failed.store(true, Ordering::Release);
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut starved = false;
                for out in data.iter_mut() {
                    *out = match consumer.try_pop() {
                        Some(sample) => sample as f32 / 32768.0,
                        None => {
                            starved = true;
                            0.0
                        }
                    };
                }
                if starved {
                    underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            error_callback,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let filled = consumer.pop_slice(data);
                if filled < data.len() {
                    data[filled..].fill(0);
                    underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            error_callback,
            None,
        ),
        other => {
            return Err(Error::Sink(format!("Unsupported device sample format {:?}", other)));
        }
    };

    stream.map_err(|e| Error::Sink(format!("Failed to build stream: {}", e)))
}
