//! Per-button debounce
//!
//! Only rising edges (level going high) are candidate presses. A candidate is
//! discarded when it arrives less than one window after the button's last
//! accepted press.
//!
//! With `require_stable_level` a surviving candidate is not accepted on the
//! edge itself: the level must stay high for a full window first. A falling
//! edge inside the window cancels it. Sources that only report edges never
//! call back at the end of the window, so the owner asks for
//! [`Debouncer::pending_deadline`] and calls [`Debouncer::poll`] when it
//! passes.

use std::time::{Duration, Instant};

/// Logical button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    /// Button A: play / stop
    Play,
    /// Button B: mix on / off
    Mix,
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonId::Play => write!(f, "play"),
            ButtonId::Mix => write!(f, "mix"),
        }
    }
}

/// Electrical level of a button line (High = pressed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Raw edge as captured by the interrupt or poll source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    require_stable_level: bool,
    level: Level,
    last_accepted: Option<Instant>,
    /// Rising edge waiting out the stability window
    pending_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration, require_stable_level: bool) -> Self {
        Self {
            window,
            require_stable_level,
            level: Level::Low,
            last_accepted: None,
            pending_since: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Last observed level
    pub fn level(&self) -> Level {
        self.level
    }

    /// Feed an edge; returns `true` if it is accepted as a press right away.
    pub fn on_edge(&mut self, level: Level, at: Instant) -> bool {
        self.level = level;

        match level {
            Level::Low => {
                self.pending_since = None;
                false
            }
            Level::High => {
                if !self.window_elapsed_since_accept(at) {
                    return false;
                }
                if self.require_stable_level {
                    // Bounce while already pending keeps the original start
                    self.pending_since.get_or_insert(at);
                    false
                } else {
                    self.last_accepted = Some(at);
                    true
                }
            }
        }
    }

    /// Accept a pending press whose level has held for the full window.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(since) = self.pending_since else {
            return false;
        };
        if self.level != Level::High || now.saturating_duration_since(since) < self.window {
            return false;
        }
        self.pending_since = None;
        self.last_accepted = Some(now);
        true
    }

    /// When [`poll`](Self::poll) should next be called, if a press is pending
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending_since.map(|since| since + self.window)
    }

    fn window_elapsed_since_accept(&self, at: Instant) -> bool {
        match self.last_accepted {
            Some(last) => at.saturating_duration_since(last) >= self.window,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn test_second_press_inside_window_discarded() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, false);

        assert!(d.on_edge(Level::High, t0));
        assert!(!d.on_edge(Level::Low, ms(t0, 5)));
        assert!(!d.on_edge(Level::High, ms(t0, 120)));
        assert!(!d.on_edge(Level::Low, ms(t0, 130)));
        assert!(d.on_edge(Level::High, ms(t0, 500)));
    }

    #[test]
    fn test_falling_edges_never_accepted() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, false);
        assert!(!d.on_edge(Level::Low, t0));
        assert!(!d.on_edge(Level::Low, ms(t0, 900)));
    }

    #[test]
    fn test_discarded_edge_does_not_extend_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, false);

        assert!(d.on_edge(Level::High, t0));
        assert!(!d.on_edge(Level::High, ms(t0, 400)));
        // Measured from the accepted edge at t0, not the discarded one
        assert!(d.on_edge(Level::High, ms(t0, 510)));
    }

    #[test]
    fn test_stable_level_accepted_after_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, true);

        assert!(!d.on_edge(Level::High, t0));
        assert_eq!(d.pending_deadline(), Some(ms(t0, 500)));
        assert!(!d.poll(ms(t0, 499)));
        assert!(d.poll(ms(t0, 500)));
        assert_eq!(d.pending_deadline(), None);

        // Still held: no second press
        assert!(!d.poll(ms(t0, 2000)));
    }

    #[test]
    fn test_stable_level_cancelled_by_release() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, true);

        d.on_edge(Level::High, t0);
        d.on_edge(Level::Low, ms(t0, 100));
        assert_eq!(d.pending_deadline(), None);
        assert!(!d.poll(ms(t0, 600)));
    }

    #[test]
    fn test_stable_level_bounce_keeps_start() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, true);

        d.on_edge(Level::High, t0);
        d.on_edge(Level::High, ms(t0, 50));
        assert_eq!(d.pending_deadline(), Some(ms(t0, 500)));
    }
}
