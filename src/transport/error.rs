//! Transport error types

use thiserror::Error;

use crate::protocol::FrameError;

/// Failures of the underlying socket
///
/// These never escape the channel as panics or aborted tasks; the channel
/// converts them into [`ChannelEvent::Error`](super::ChannelEvent) followed
/// by a close and a reconnect decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint URL could not be turned into a handshake request
    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection refused, DNS failure, handshake rejected
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// I/O or protocol violation on an established socket
    #[error("Socket error: {0}")]
    Socket(String),

    /// Writing to a socket whose peer already went away
    #[error("Socket closed")]
    Closed,
}

/// Errors returned to callers of [`TransportChannel::send`](super::TransportChannel::send)
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel is not OPEN; the frame was dropped, not queued
    #[error("Channel is not open, frame dropped")]
    NotOpen,

    #[error(transparent)]
    Encode(#[from] FrameError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::ConnectFailed("connection refused".to_string());
        assert_eq!(err.to_string(), "Connect failed: connection refused");

        let err = ChannelError::NotOpen;
        assert_eq!(err.to_string(), "Channel is not open, frame dropped");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: ChannelError = TransportError::Closed.into();
        assert!(matches!(err, ChannelError::Transport(TransportError::Closed)));
    }
}
