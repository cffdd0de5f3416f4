//! Notification of sessions that ended without the user asking.
//!
//! When a renewal episode fails, the session manager clears the stored
//! credentials and calls [`SessionListener::session_ended`] exactly once for
//! that episode. Front ends use it to send the user back to login.

use tokio::sync::mpsc;

use crate::session::SessionError;

/// Receiver of "the session is over, re-authenticate" signals.
pub trait SessionListener: Send + Sync {
    /// Called once per failed renewal episode, after credentials are cleared.
    fn session_ended(&self, reason: &SessionError);
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl SessionListener for LogListener {
    fn session_ended(&self, reason: &SessionError) {
        tracing::warn!("Session ended ({}), log in again to continue", reason);
    }
}

/// Listener that forwards every signal into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SessionError>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionListener for ChannelListener {
    fn session_ended(&self, reason: &SessionError) {
        if self.tx.send(reason.clone()).is_err() {
            tracing::debug!("Session-ended receiver dropped");
        }
    }
}
