//! Host-side button sources
//!
//! Two ways to produce raw edges for the control loop:
//!
//! - [`run_key_source`]: line-oriented keyboard input. `p` presses button A,
//!   `m` presses button B, `q` quits. Each key becomes a high edge followed by
//!   a low edge.
//! - [`run_level_poller`]: samples a [`LevelSource`] on a fixed period and
//!   reports level changes, for hardware without edge interrupts.
//!   [`SysfsLevelSource`] reads GPIO value files.

use crate::control::debounce::{ButtonId, Level};
use crate::control::machine::EdgeNotifier;
use crate::error::{Error, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Read key presses until `q`, end of input, or a read error.
///
/// `quit` fires only when `q` is typed; running detached from a terminal
/// (stdin at EOF) leaves the process to other shutdown signals.
pub async fn run_key_source<R>(reader: R, notifier: EdgeNotifier, quit: oneshot::Sender<()>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Key input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Key input failed, keyboard control disabled");
                return;
            }
        };

        for key in line.trim().chars() {
            let button = match key.to_ascii_lowercase() {
                'p' => ButtonId::Play,
                'm' => ButtonId::Mix,
                'q' => {
                    info!("Quit requested from keyboard");
                    let _ = quit.send(());
                    return;
                }
                other => {
                    debug!(key = %other, "Ignoring key");
                    continue;
                }
            };
            notifier.notify(button, Level::High);
            notifier.notify(button, Level::Low);
        }
    }
}

/// Instantaneous level of the button lines
pub trait LevelSource: Send {
    fn read_level(&mut self, button: ButtonId) -> Result<Level>;
}

/// Poll `source` every `period`, reporting each level change as an edge.
///
/// Runs until `shutdown` resolves. Read failures are logged once per
/// failure streak and the previous level is kept.
pub async fn run_level_poller<S, F>(mut source: S, notifier: EdgeNotifier, period: Duration, shutdown: F)
where
    S: LevelSource,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut levels = [Level::Low, Level::Low];
    let mut failing = [false, false];

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        for (idx, button) in [ButtonId::Play, ButtonId::Mix].into_iter().enumerate() {
            match source.read_level(button) {
                Ok(level) => {
                    failing[idx] = false;
                    if level != levels[idx] {
                        levels[idx] = level;
                        notifier.notify(button, level);
                    }
                }
                Err(e) => {
                    if !failing[idx] {
                        warn!(button = %button, error = %e, "Cannot read button level");
                        failing[idx] = true;
                    }
                }
            }
        }
    }

    debug!(dropped_edges = notifier.dropped(), "Level poller stopped");
}

/// Button levels read from GPIO value files (`/sys/class/gpio/gpioN/value`)
#[derive(Debug, Clone)]
pub struct SysfsLevelSource {
    play: PathBuf,
    mix: PathBuf,
    /// Pressed reads as `0` (pull-up wiring)
    active_low: bool,
}

impl SysfsLevelSource {
    pub fn new(play: impl Into<PathBuf>, mix: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            play: play.into(),
            mix: mix.into(),
            active_low,
        }
    }
}

impl LevelSource for SysfsLevelSource {
    fn read_level(&mut self, button: ButtonId) -> Result<Level> {
        let path = match button {
            ButtonId::Play => &self.play,
            ButtonId::Mix => &self.mix,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;

        let high = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(Error::InvalidState(format!(
                    "unexpected GPIO value '{}' in {}",
                    other,
                    path.display()
                )))
            }
        };

        Ok(if high != self.active_low { Level::High } else { Level::Low })
    }
}
