//! Storage wrapper for lifecycle and fault-injection tests
//!
//! Wraps `FsStorage`: every opened handle is counted and logs `open:<name>` /
//! `close:<name>` on the shared [`Recorder`] timeline. A read fault can be
//! armed for one file at a byte offset.

use super::recording_sink::Recorder;
use mixdeck_player::audio::storage::{FsStorage, MediaSource, Storage};
use mixdeck_player::Result;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct ReadFault {
    file: String,
    offset: u64,
}

pub struct TrackingStorage {
    inner: FsStorage,
    recorder: Arc<Recorder>,
    open_handles: Arc<AtomicUsize>,
    fault: Mutex<Option<ReadFault>>,
}

impl TrackingStorage {
    pub fn new(root: impl Into<PathBuf>, recorder: Arc<Recorder>) -> Self {
        Self {
            inner: FsStorage::new(root),
            recorder,
            open_handles: Arc::new(AtomicUsize::new(0)),
            fault: Mutex::new(None),
        }
    }

    /// Fail reads of `file` at or beyond byte `offset`
    pub fn fail_reads_from(&self, file: &str, offset: u64) {
        *self.fault.lock().unwrap() = Some(ReadFault {
            file: file.to_string(),
            offset,
        });
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl Storage for TrackingStorage {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let inner = self.inner.open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let fail_at = self
            .fault
            .lock()
            .unwrap()
            .as_ref()
            .filter(|f| f.file == name)
            .map(|f| f.offset);

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.recorder.note(format!("open:{}", name));

        Ok(Box::new(TrackedSource {
            inner,
            name,
            position: 0,
            fail_at,
            recorder: Arc::clone(&self.recorder),
            open_handles: Arc::clone(&self.open_handles),
        }))
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.list()
    }
}

struct TrackedSource {
    inner: Box<dyn MediaSource>,
    name: String,
    position: u64,
    fail_at: Option<u64>,
    recorder: Arc<Recorder>,
    open_handles: Arc<AtomicUsize>,
}

impl Read for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut limit = buf.len();
        if let Some(fail_at) = self.fail_at {
            if self.position >= fail_at {
                return Err(io::Error::new(io::ErrorKind::Other, "injected read fault"));
            }
            limit = limit.min((fail_at - self.position) as usize);
        }
        let n = self.inner.read(&mut buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for TrackedSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
        self.recorder.note(format!("close:{}", self.name));
    }
}
