//! Event types - channel naming and payloads

use crate::core::SessionId;
use std::sync::Arc;

/// Channel prefix for raw PTY output chunks
pub const OUTPUT_CHANNEL_PREFIX: &str = "session-output-";

/// Channel prefix for the single exit notification
pub const EXIT_CHANNEL_PREFIX: &str = "session-exit-";

/// `session-output-{id}`
pub fn output_channel(session_id: &SessionId) -> String {
    format!("{}{}", OUTPUT_CHANNEL_PREFIX, session_id)
}

/// `session-exit-{id}`
pub fn exit_channel(session_id: &SessionId) -> String {
    format!("{}{}", EXIT_CHANNEL_PREFIX, session_id)
}

/// Payload delivered on a session channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Raw bytes, not decoded. May split multi-byte sequences.
    Output(Arc<[u8]>),

    /// The session's process is gone. Last event on the session.
    Exit,
}

impl ChannelEvent {
    pub fn output(bytes: impl Into<Arc<[u8]>>) -> Self {
        ChannelEvent::Output(bytes.into())
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, ChannelEvent::Exit)
    }
}
