//! Button edges → control intents
//!
//! Edge capture and decision-making run on different threads of control:
//!
//! - [`EdgeNotifier::notify`] is what an interrupt handler (or poll source)
//!   calls. It stamps the edge and `try_send`s it into a bounded channel. It
//!   never blocks, allocates, or logs; a full channel drops the edge and bumps
//!   a counter.
//! - [`ControlStateMachine::run`] drains that channel on the async runtime,
//!   debounces per button and hands each accepted press to an
//!   [`IntentHandler`] (the pipeline).

use crate::control::debounce::{ButtonEvent, ButtonId, Debouncer, Level};
use chrono::Utc;
use mixdeck_common::events::{ControlIntent, EventBus, PlayerEvent};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Consumer of accepted intents
///
/// Handling may block (stopping a session waits for its teardown), so the
/// control loop calls it from the blocking pool.
pub trait IntentHandler: Send + Sync {
    fn handle_intent(&self, intent: ControlIntent);
}

/// Non-blocking edge sink handed to button sources
#[derive(Clone, Debug)]
pub struct EdgeNotifier {
    tx: mpsc::Sender<ButtonEvent>,
    dropped: Arc<AtomicU64>,
}

impl EdgeNotifier {
    /// Record an edge observed now
    pub fn notify(&self, button: ButtonId, level: Level) -> bool {
        self.notify_at(button, level, Instant::now())
    }

    /// Record an edge with an explicit capture time.
    ///
    /// Returns `false` if the edge was dropped (queue full or control loop gone).
    pub fn notify_at(&self, button: ButtonId, level: Level, at: Instant) -> bool {
        match self.tx.try_send(ButtonEvent { button, level, at }) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Edges lost to a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of the edge queue, owned by the control loop
#[derive(Debug)]
pub struct EdgeReceiver {
    rx: mpsc::Receiver<ButtonEvent>,
    dropped: Arc<AtomicU64>,
}

impl EdgeReceiver {
    /// Next edge; `None` once every notifier is gone and the queue is empty
    pub async fn recv(&mut self) -> Option<ButtonEvent> {
        self.rx.recv().await
    }

    /// Edges lost to a full queue, across all notifiers
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded edge queue between button sources and the control loop
pub fn edge_channel(capacity: usize) -> (EdgeNotifier, EdgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EdgeNotifier {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EdgeReceiver { rx, dropped },
    )
}

fn intent_for(button: ButtonId) -> ControlIntent {
    match button {
        ButtonId::Play => ControlIntent::TogglePlay,
        ButtonId::Mix => ControlIntent::ToggleMix,
    }
}

/// Debounces both buttons and maps accepted presses to intents
#[derive(Debug, Clone)]
pub struct ControlStateMachine {
    play: Debouncer,
    mix: Debouncer,
    events: Option<EventBus>,
    accepted: u64,
    discarded: u64,
}

impl ControlStateMachine {
    pub fn new(window: Duration, require_stable_level: bool) -> Self {
        Self {
            play: Debouncer::new(window, require_stable_level),
            mix: Debouncer::new(window, require_stable_level),
            events: None,
            accepted: 0,
            discarded: 0,
        }
    }

    /// Publish `IntentAccepted` for every accepted press
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn debouncer(&mut self, button: ButtonId) -> &mut Debouncer {
        match button {
            ButtonId::Play => &mut self.play,
            ButtonId::Mix => &mut self.mix,
        }
    }

    /// Feed one raw edge; returns the intent if it is accepted immediately.
    pub fn on_edge(&mut self, event: ButtonEvent) -> Option<ControlIntent> {
        let accepted = self.debouncer(event.button).on_edge(event.level, event.at);
        if accepted {
            Some(self.accept(event.button))
        } else {
            if event.level == Level::High {
                self.discarded += 1;
                trace!(button = %event.button, "Edge held or discarded by debounce");
            }
            None
        }
    }

    /// Accept presses whose stability window has passed
    pub fn poll(&mut self, now: Instant) -> Vec<ControlIntent> {
        let mut intents = Vec::new();
        for button in [ButtonId::Play, ButtonId::Mix] {
            if self.debouncer(button).poll(now) {
                intents.push(self.accept(button));
            }
        }
        intents
    }

    /// Earliest pending stability deadline across both buttons
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.play.pending_deadline(), self.mix.pending_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Presses accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    fn accept(&mut self, button: ButtonId) -> ControlIntent {
        let intent = intent_for(button);
        self.accepted += 1;
        debug!(button = %button, %intent, "Button press accepted");
        if let Some(events) = &self.events {
            events.emit_lossy(PlayerEvent::IntentAccepted {
                intent,
                timestamp: Utc::now(),
            });
        }
        intent
    }

    /// Drive the state machine until `shutdown` resolves or every notifier is dropped.
    ///
    /// Intents are dispatched one at a time in acceptance order. When the
    /// sources close, presses still waiting out their stability window are
    /// settled before returning.
    pub async fn run<H, F>(
        mut self,
        mut edges: EdgeReceiver,
        handler: Arc<H>,
        shutdown: F,
    ) where
        H: IntentHandler + ?Sized + 'static,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(window_ms = self.play.window().as_millis() as u64, "Control loop started");
        let mut dropped_seen = 0;

        loop {
            let deadline = self.next_deadline();
            let timer = tokio::time::sleep_until(
                deadline
                    .map(tokio::time::Instant::from_std)
                    .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600)),
            );

            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Control loop shutdown requested");
                    break;
                }
                edge = edges.recv() => {
                    let Some(edge) = edge else {
                        debug!("All button sources closed");
                        self.settle_pending(&handler, &mut shutdown).await;
                        break;
                    };
                    let dropped = edges.dropped();
                    if dropped > dropped_seen {
                        warn!(lost = dropped - dropped_seen, total = dropped, "Button edges dropped, edge queue was full");
                        dropped_seen = dropped;
                    }
                    if let Some(intent) = self.on_edge(edge) {
                        dispatch(&handler, intent).await;
                    }
                }
                _ = timer, if deadline.is_some() => {
                    for intent in self.poll(Instant::now()) {
                        dispatch(&handler, intent).await;
                    }
                }
            }
        }

        info!(
            accepted = self.accepted,
            discarded = self.discarded,
            dropped_edges = edges.dropped(),
            "Control loop stopped"
        );
    }

    /// Wait out pending stability windows and dispatch what survives
    async fn settle_pending<H, F>(&mut self, handler: &Arc<H>, shutdown: &mut std::pin::Pin<&mut F>)
    where
        H: IntentHandler + ?Sized + 'static,
        F: Future<Output = ()>,
    {
        while let Some(deadline) = self.next_deadline() {
            tokio::select! {
                _ = shutdown.as_mut() => return,
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
            }
            for intent in self.poll(Instant::now()) {
                dispatch(handler, intent).await;
            }
        }
    }
}

async fn dispatch<H: IntentHandler + ?Sized + 'static>(handler: &Arc<H>, intent: ControlIntent) {
    let handler = Arc::clone(handler);
    if tokio::task::spawn_blocking(move || handler.handle_intent(intent))
        .await
        .is_err()
    {
        error!(%intent, "Intent handler panicked");
    }
}
