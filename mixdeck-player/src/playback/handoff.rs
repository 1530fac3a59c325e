//! Bounded producer → consumer hand-off
//!
//! A fixed-capacity FIFO of sample blocks with overwrite-on-full: a push into
//! a full buffer evicts the oldest pending block rather than blocking the
//! producer. The consumer blocks on a condition variable until a block
//! arrives or the buffer is closed.
//!
//! Closing is the shutdown sentinel. Blocks still queued at close time are
//! handed out before `pop` reports the end, unless they were discarded first.

use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Overwrites logged at `warn!`: the first, then every Nth
const OVERWRITE_LOG_INTERVAL: u64 = 100;

/// One block of mixed samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    /// Generation order within the session, starting at 0
    pub seq: u64,
    pub samples: Vec<i16>,
}

struct Inner {
    ring: HeapRb<AudioBlock>,
    closed: bool,
}

/// Blocking FIFO shared by the producer and consumer threads
pub struct HandoffBuffer {
    inner: Mutex<Inner>,
    available: Condvar,
    overwrites: AtomicU64,
}

impl HandoffBuffer {
    /// # Panics
    /// If `capacity` is zero. Configuration validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "hand-off capacity must be at least 1");
        Self {
            inner: Mutex::new(Inner {
                ring: HeapRb::new(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            overwrites: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking holder cannot leave the ring half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a block, evicting the oldest pending one if full.
    ///
    /// Returns `true` if a block was overwritten. Pushing into a closed
    /// buffer drops the block.
    pub fn push(&self, block: AudioBlock) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            trace!(seq = block.seq, "Hand-off closed, dropping block");
            return false;
        }

        let evicted = inner.ring.push_overwrite(block);
        drop(inner);
        self.available.notify_one();

        match evicted {
            Some(old) => {
                let count = self.overwrites.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % OVERWRITE_LOG_INTERVAL == 0 {
                    warn!(seq = old.seq, total = count, "Hand-off queue full, overwriting oldest block");
                } else {
                    trace!(seq = old.seq, total = count, "Hand-off queue full, overwriting oldest block");
                }
                true
            }
            None => false,
        }
    }

    /// Take the oldest block, waiting while the buffer is empty and open.
    ///
    /// Returns `None` once the buffer is closed and empty.
    pub fn pop(&self) -> Option<AudioBlock> {
        let mut inner = self.lock();
        loop {
            if let Some(block) = inner.ring.try_pop() {
                return Some(block);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop)
    pub fn try_pop(&self) -> Option<AudioBlock> {
        self.lock().ring.try_pop()
    }

    /// Wake the consumer and refuse further blocks
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    /// Drop pending blocks, then close. Returns how many were dropped.
    pub fn discard_and_close(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.ring.occupied_len();
        inner.ring.clear();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
        dropped
    }

    /// Empty and reopen for a new session
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.ring.clear();
        inner.closed = false;
        self.overwrites.store(0, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Pending blocks
    pub fn len(&self) -> usize {
        self.lock().ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().ring.capacity().get()
    }

    /// Blocks evicted by overwrite-on-full since the last reset
    pub fn overwrites(&self) -> u64 {
        self.overwrites.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HandoffBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("HandoffBuffer")
            .field("pending", &inner.ring.occupied_len())
            .field("capacity", &inner.ring.capacity())
            .field("closed", &inner.closed)
            .field("overwrites", &self.overwrites())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn block(seq: u64) -> AudioBlock {
        AudioBlock {
            seq,
            samples: vec![seq as i16; 4],
        }
    }

    #[test]
    fn test_overwrite_on_full_keeps_newest() {
        let buffer = HandoffBuffer::new(1);

        assert!(!buffer.push(block(0)));
        assert!(buffer.push(block(1)));
        assert_eq!(buffer.overwrites(), 1);

        buffer.close();
        assert_eq!(buffer.pop().map(|b| b.seq), Some(1));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_fifo_order_preserved() {
        let buffer = HandoffBuffer::new(8);
        for seq in 0..5 {
            buffer.push(block(seq));
        }
        buffer.close();

        let seqs: Vec<u64> = std::iter::from_fn(|| buffer.pop()).map(|b| b.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_overwrite_drops_only_oldest() {
        let buffer = HandoffBuffer::new(3);
        for seq in 0..5 {
            buffer.push(block(seq));
        }
        buffer.close();

        let seqs: Vec<u64> = std::iter::from_fn(|| buffer.pop()).map(|b| b.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(buffer.overwrites(), 2);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let buffer = Arc::new(HandoffBuffer::new(2));
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.pop())
        };

        thread::sleep(Duration::from_millis(50));
        buffer.push(block(7));

        assert_eq!(consumer.join().unwrap().map(|b| b.seq), Some(7));
    }

    #[test]
    fn test_close_wakes_waiting_consumer() {
        let buffer = Arc::new(HandoffBuffer::new(2));
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.pop())
        };

        thread::sleep(Duration::from_millis(50));
        buffer.close();

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_discard_and_close() {
        let buffer = HandoffBuffer::new(4);
        buffer.push(block(0));
        buffer.push(block(1));

        assert_eq!(buffer.discard_and_close(), 2);
        assert_eq!(buffer.pop(), None);
        assert!(!buffer.push(block(2)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reset_reopens_empty() {
        let buffer = HandoffBuffer::new(1);
        buffer.push(block(0));
        buffer.push(block(1));
        buffer.close();

        buffer.reset();
        assert!(!buffer.is_closed());
        assert!(buffer.is_empty());
        assert_eq!(buffer.overwrites(), 0);

        buffer.push(block(9));
        assert_eq!(buffer.try_pop().map(|b| b.seq), Some(9));
    }
}
