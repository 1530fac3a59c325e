//! Event types for the mixdeck event system
//!
//! Playback and control components publish [`PlayerEvent`]s on an [`EventBus`];
//! the binary subscribes and logs them. Publishing never blocks, so events can
//! be emitted from the producer thread without affecting audio timing.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why a playback session ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Play button pressed while playing
    StopRequested,
    /// Primary stream ran out of samples
    EndOfStream,
    /// Read failure on the primary stream
    StorageError,
    /// Audio sink rejected a write
    SinkError,
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEndReason::StopRequested => write!(f, "stop requested"),
            SessionEndReason::EndOfStream => write!(f, "end of stream"),
            SessionEndReason::StorageError => write!(f, "storage error"),
            SessionEndReason::SinkError => write!(f, "sink error"),
        }
    }
}

/// Logical control intent produced by a debounced button press
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlIntent {
    /// Button A: start or stop playback
    TogglePlay,
    /// Button B: blend the mix stream in or out
    ToggleMix,
}

impl std::fmt::Display for ControlIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlIntent::TogglePlay => write!(f, "toggle-play"),
            ControlIntent::ToggleMix => write!(f, "toggle-mix"),
        }
    }
}

/// Mixdeck event types
///
/// Serialized with an internal `type` tag so log consumers can filter on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Producer and consumer are running
    SessionStarted {
        session_id: Uuid,
        primary_file: String,
        sample_rate: u32,
        channels: u16,
        /// Whether the mix stream was blended in from the first block
        mixing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Idle → Playing transition failed; system stays idle
    SessionStartFailed {
        file: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session torn down; sink stopped and file handles released
    SessionEnded {
        session_id: Uuid,
        reason: SessionEndReason,
        /// Blocks written to the sink
        blocks_delivered: u64,
        /// Pending blocks dropped by overwrite-on-full
        overwritten_blocks: u64,
        /// Sink writes that accepted fewer bytes than offered
        short_writes: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Mix request flag flipped by the user
    MixChanged {
        active: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Mix stream ran out before the primary; it was rewound and disengaged
    MixExhausted {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A button press survived debouncing
    IntentAccepted {
        intent: ControlIntent,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Short event name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::SessionStarted { .. } => "SessionStarted",
            PlayerEvent::SessionStartFailed { .. } => "SessionStartFailed",
            PlayerEvent::SessionEnded { .. } => "SessionEnded",
            PlayerEvent::MixChanged { .. } => "MixChanged",
            PlayerEvent::MixExhausted { .. } => "MixExhausted",
            PlayerEvent::IntentAccepted { .. } => "IntentAccepted",
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// `emit` is a plain synchronous call and is safe from std threads.
///
/// # Examples
///
/// ```
/// use mixdeck_common::events::{EventBus, PlayerEvent};
///
/// let bus = EventBus::new(64);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PlayerEvent::MixChanged {
///     active: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(PlayerEvent::MixChanged { active: true, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
