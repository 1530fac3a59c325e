//! Configuration file resolution and TOML loading
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`<config dir>/mixdeck/config.toml`)
//! 4. System config file (`/etc/mixdeck/config.toml`)
//! 5. Compiled defaults (fallback)
//!
//! A missing file never aborts startup: the caller receives the defaults
//! together with a [`ConfigSource`] describing what happened, and logs it once
//! logging is up.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MIXDECK_CONFIG";

/// Application directory name under the platform config dir
const APP_DIR: &str = "mixdeck";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line
    CommandLine(PathBuf),
    /// Path taken from the environment variable
    Environment(PathBuf),
    /// Per-user config file
    UserFile(PathBuf),
    /// System-wide config file
    SystemFile(PathBuf),
    /// Explicitly requested file did not exist; defaults were used
    Missing(PathBuf),
    /// No file found anywhere; compiled defaults
    Defaults,
}

impl ConfigSource {
    /// Path of the file to read, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserFile(p)
            | ConfigSource::SystemFile(p) => Some(p),
            ConfigSource::Missing(_) | ConfigSource::Defaults => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CommandLine(p) => write!(f, "command line ({})", p.display()),
            ConfigSource::Environment(p) => write!(f, "environment ({})", p.display()),
            ConfigSource::UserFile(p) => write!(f, "user config ({})", p.display()),
            ConfigSource::SystemFile(p) => write!(f, "system config ({})", p.display()),
            ConfigSource::Missing(p) => write!(f, "defaults ({} not found)", p.display()),
            ConfigSource::Defaults => write!(f, "compiled defaults"),
        }
    }
}

/// A loaded configuration value together with its origin
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub config: T,
    pub source: ConfigSource,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Resolve which config file to use.
///
/// Explicit locations (command line, environment) are returned even when the
/// file does not exist so the loader can report it; implicit locations are
/// only returned when present on disk.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    if let Some(path) = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)) {
        if path.exists() {
            return ConfigSource::UserFile(path);
        }
    }

    // Priority 4: System-wide config file
    let system = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
    if cfg!(unix) && system.exists() {
        return ConfigSource::SystemFile(system);
    }

    ConfigSource::Defaults
}

/// Load a TOML configuration from the resolved source.
///
/// # Errors
/// - File exists but cannot be read
/// - File contents are not valid TOML for `T`
pub fn load_toml_config<T>(source: ConfigSource) -> Result<Loaded<T>>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path().map(Path::to_path_buf) else {
        return Ok(Loaded {
            config: T::default(),
            source,
        });
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Loaded {
                config: T::default(),
                source: ConfigSource::Missing(path),
            });
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let config = parse_toml(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    Ok(Loaded { config, source })
}

/// Parse TOML text into a configuration struct
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}
