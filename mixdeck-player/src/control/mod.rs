//! Button control
//!
//! Raw edges come in through an [`EdgeNotifier`], are debounced per button by
//! the [`ControlStateMachine`], and leave as `ControlIntent`s delivered to an
//! [`IntentHandler`].

pub mod debounce;
pub mod machine;
pub mod source;

pub use debounce::{ButtonEvent, ButtonId, Debouncer, Level};
pub use machine::{edge_channel, ControlStateMachine, EdgeNotifier, EdgeReceiver, IntentHandler};
