//! Session events.
//!
//! The session is the single writer of connection state. Everything else
//! (the UI, the CLI, payment flows) observes it through a broadcast channel
//! of [`SessionEvent`]s, emitted after the state change is committed.
//!
//! # Event Flow
//!
//! 1. Wallet emits a `ProviderEvent` -> session listener task
//! 2. Session rebinds its state and cancels affected monitors
//! 3. Session emits a `SessionEvent` -> observers

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, SessionEventReceiver, SessionEventSender, session_event_channel,
};
pub use types::SessionEvent;
