//! Socket abstraction
//!
//! The channel talks to the network through these traits so the state
//! machine can run against a real WebSocket ([`WsConnector`](super::WsConnector))
//! or an in-process loopback ([`MemoryConnector`](super::MemoryConnector)).

use async_trait::async_trait;

use super::error::TransportError;

/// One message read from a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Ping frame with payload
    Ping(Vec<u8>),
    /// Pong frame with payload
    Pong(Vec<u8>),
    /// Close frame sent by the peer
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code)
        code: u16,
        reason: String,
    },
}

/// Write half of an established socket
#[async_trait]
pub trait FrameSink: Send {
    /// Write a UTF-8 text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Answer a ping
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Send a close frame and shut the write half down
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an established socket
#[async_trait]
pub trait FrameSource: Send {
    /// Next message, or `None` once the stream has ended
    ///
    /// Must be cancel-safe: the channel polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>>;
}

/// Split halves of a freshly opened socket
pub type SocketHalves = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Opens sockets to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket and complete the handshake
    async fn connect(&self, url: &str) -> Result<SocketHalves, TransportError>;
}
