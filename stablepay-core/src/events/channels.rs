//! Event channel factories and handles.

use super::types::SessionEvent;
use tokio::sync::broadcast;

/// Default buffer size for event channels.
///
/// Observers that fall further behind than this see a `Lagged` error and
/// should re-read the session snapshot.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Sender handle for SessionEvent events.
pub type SessionEventSender = broadcast::Sender<SessionEvent>;
/// Receiver handle for SessionEvent events.
pub type SessionEventReceiver = broadcast::Receiver<SessionEvent>;

/// Create a new SessionEvent channel.
///
/// Receivers are created from the sender with `subscribe()`; the initial
/// receiver is dropped.
pub fn session_event_channel() -> SessionEventSender {
    let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_BUFFER);
    tx
}
