//! # Mixdeck Common Library
//!
//! Shared code for the mixdeck player crates:
//! - Error type used by configuration loading
//! - Configuration file resolution and TOML loading
//! - Event types (PlayerEvent) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PlayerEvent};
