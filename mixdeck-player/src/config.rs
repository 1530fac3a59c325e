//! Player configuration
//!
//! Loaded from TOML (see `mixdeck_common::config` for file resolution), then
//! overridden by command-line flags and environment variables in `main`.
//! Every key is optional; missing sections fall back to built-in defaults.
//!
//! ```toml
//! [storage]
//! root = "/sdcard"
//!
//! [playback]
//! primary_file = "gong.wav"
//! mix_file = "huh.wav"
//! block_samples = 1024
//! queue_capacity = 20
//!
//! [control]
//! source = "keyboard"        # keyboard | gpio
//! debounce_ms = 500
//! require_stable_level = false
//! edge_queue_capacity = 32
//!
//! [output]
//! kind = "device"            # device | wav | null
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::playback::PipelineSettings;
use mixdeck_common::config::LoggingConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Complete player configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub storage: StorageConfig,
    pub playback: PlaybackConfig,
    pub control: ControlConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Mount point of the removable storage
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Primary stream, relative to the storage root
    #[serde(default = "default_primary_file")]
    pub primary_file: PathBuf,

    /// Stream blended in by button B
    #[serde(default = "default_mix_file")]
    pub mix_file: PathBuf,

    /// Samples per hand-off block
    #[serde(default = "default_block_samples")]
    pub block_samples: usize,

    /// Hand-off capacity in blocks
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            primary_file: default_primary_file(),
            mix_file: default_mix_file(),
            block_samples: default_block_samples(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Where raw button edges come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButtonSourceKind {
    /// `p` / `m` / `q` on standard input
    #[default]
    Keyboard,
    /// GPIO value files polled at `poll_interval_ms`
    Gpio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub source: ButtonSourceKind,

    /// Minimum time between two accepted presses of one button
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Accept a press only after the level stayed high for the whole window
    /// (gpio source only; key presses have no held level)
    #[serde(default)]
    pub require_stable_level: bool,

    /// Raw edges buffered between sources and the control loop
    #[serde(default = "default_edge_queue_capacity")]
    pub edge_queue_capacity: usize,

    /// GPIO value file for button A (gpio source only)
    #[serde(default)]
    pub play_gpio: Option<PathBuf>,

    /// GPIO value file for button B (gpio source only)
    #[serde(default)]
    pub mix_gpio: Option<PathBuf>,

    /// Pressed buttons read as `0`
    #[serde(default)]
    pub active_low: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            source: ButtonSourceKind::default(),
            debounce_ms: default_debounce_ms(),
            require_stable_level: false,
            edge_queue_capacity: default_edge_queue_capacity(),
            play_gpio: None,
            mix_gpio: None,
            active_low: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ControlConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Audio sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Audio device through cpal
    #[default]
    Device,
    /// Render sessions to a WAV file
    Wav,
    /// Discard samples (paced at real time)
    Null,
}

impl std::str::FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "device" => Ok(SinkKind::Device),
            "wav" => Ok(SinkKind::Wav),
            "null" => Ok(SinkKind::Null),
            other => Err(Error::Config(format!(
                "unknown output kind '{}' (expected device, wav or null)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Output device name (None = host default)
    #[serde(default)]
    pub device: Option<String>,

    /// Target file for the wav sink
    #[serde(default = "default_wav_path")]
    pub wav_path: PathBuf,

    /// Longest a device write waits for room before reporting a short write
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            device: None,
            wav_path: default_wav_path(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl OutputConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/sdcard")
}

fn default_primary_file() -> PathBuf {
    PathBuf::from("gong.wav")
}

fn default_mix_file() -> PathBuf {
    PathBuf::from("huh.wav")
}

fn default_block_samples() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    20
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_edge_queue_capacity() -> usize {
    32
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_wav_path() -> PathBuf {
    PathBuf::from("mixdeck-out.wav")
}

fn default_write_timeout_ms() -> u64 {
    250
}

impl PlayerConfig {
    /// Check value ranges after all overrides are applied
    pub fn validate(&self) -> Result<()> {
        if self.playback.block_samples == 0 {
            return Err(Error::Config("playback.block_samples must be at least 1".to_string()));
        }
        if self.playback.queue_capacity == 0 {
            return Err(Error::Config("playback.queue_capacity must be at least 1".to_string()));
        }
        if self.control.edge_queue_capacity == 0 {
            return Err(Error::Config(
                "control.edge_queue_capacity must be at least 1".to_string(),
            ));
        }
        // Key presses arrive as an instant high/low pair and never hold a level
        if self.control.source == ButtonSourceKind::Keyboard && self.control.require_stable_level {
            return Err(Error::Config(
                "control.require_stable_level needs a level source (source = \"gpio\")".to_string(),
            ));
        }
        if self.control.source == ButtonSourceKind::Gpio {
            if self.control.play_gpio.is_none() || self.control.mix_gpio.is_none() {
                return Err(Error::Config(
                    "control.source = \"gpio\" requires play_gpio and mix_gpio".to_string(),
                ));
            }
            if self.control.poll_interval_ms == 0 {
                return Err(Error::Config("control.poll_interval_ms must be at least 1".to_string()));
            }
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            primary_file: self.playback.primary_file.clone(),
            mix_file: self.playback.mix_file.clone(),
            block_samples: self.playback.block_samples,
            queue_capacity: self.playback.queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdeck_common::config::parse_toml;

    #[test]
    fn test_defaults() {
        let config: PlayerConfig = parse_toml("").unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/sdcard"));
        assert_eq!(config.playback.primary_file, PathBuf::from("gong.wav"));
        assert_eq!(config.playback.mix_file, PathBuf::from("huh.wav"));
        assert_eq!(config.playback.block_samples, 1024);
        assert_eq!(config.playback.queue_capacity, 20);
        assert_eq!(config.control.debounce_ms, 500);
        assert_eq!(config.control.source, ButtonSourceKind::Keyboard);
        assert_eq!(config.output.kind, SinkKind::Device);
        assert_eq!(config.output.write_timeout(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: PlayerConfig = parse_toml(
            r#"
            [playback]
            queue_capacity = 4

            [output]
            kind = "wav"
            wav_path = "/tmp/render.wav"
            "#,
        )
        .unwrap();

        assert_eq!(config.playback.queue_capacity, 4);
        assert_eq!(config.playback.block_samples, 1024);
        assert_eq!(config.output.kind, SinkKind::Wav);
        assert_eq!(config.output.wav_path, PathBuf::from("/tmp/render.wav"));
    }

    #[test]
    fn test_zero_queue_capacity_invalid() {
        let config: PlayerConfig = parse_toml("[playback]\nqueue_capacity = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_gpio_source_requires_paths() {
        let config: PlayerConfig = parse_toml("[control]\nsource = \"gpio\"\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config: PlayerConfig = parse_toml(
            "[control]\nsource = \"gpio\"\nplay_gpio = \"/sys/class/gpio/gpio17/value\"\nmix_gpio = \"/sys/class/gpio/gpio27/value\"\n",
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stable_level_rejected_for_keyboard() {
        let config: PlayerConfig = parse_toml("[control]\nrequire_stable_level = true\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config: PlayerConfig = parse_toml(
            "[control]\nsource = \"gpio\"\nrequire_stable_level = true\nplay_gpio = \"/sys/class/gpio/gpio17/value\"\nmix_gpio = \"/sys/class/gpio/gpio27/value\"\n",
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sink_kind_from_str() {
        assert_eq!("NULL".parse::<SinkKind>().unwrap(), SinkKind::Null);
        assert!("speaker".parse::<SinkKind>().is_err());
    }
}
