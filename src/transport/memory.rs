//! In-process loopback connector
//!
//! [`MemoryConnector`] hands the channel sockets backed by tokio channels;
//! the paired [`MemoryServer`] sees every connect attempt and receives a
//! [`MemoryPeer`] for each accepted one. Used by the test suite and handy
//! for embedding the pipeline without a network.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::error::TransportError;
use super::socket::{Connector, FrameSink, FrameSource, SocketHalves, SocketMessage};
use crate::protocol::Frame;

/// A recorded connect attempt
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub url: String,
    pub at: Instant,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct Shared {
    attempts: Vec<ConnectAttempt>,
    refuse_next: u32,
    refuse_all: bool,
    connect_delay: Duration,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of the loopback
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of the loopback
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the server that observes it
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                peers: tx,
            },
            MemoryServer { shared, peers: rx },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<SocketHalves, TransportError> {
        let delay = lock(&self.shared).connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let accepted = {
            let mut shared = lock(&self.shared);
            let accepted = if shared.refuse_all {
                false
            } else if shared.refuse_next > 0 {
                shared.refuse_next -= 1;
                false
            } else {
                true
            };
            shared.attempts.push(ConnectAttempt {
                url: url.to_string(),
                at: Instant::now(),
                accepted,
            });
            accepted
        };

        if !accepted {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.peers
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::ConnectFailed("memory server is gone".to_string()))?;

        Ok((
            Box::new(MemorySink {
                tx: Some(client_tx),
            }),
            Box::new(MemorySource { rx: client_rx }),
        ))
    }
}

impl MemoryServer {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Accepted connection that is already waiting, if any
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }

    /// Refuse the next `count` connect attempts
    pub fn refuse_next(&self, count: u32) {
        lock(&self.shared).refuse_next = count;
    }

    /// Refuse every connect attempt until toggled back
    pub fn refuse_all(&self, refuse: bool) {
        lock(&self.shared).refuse_all = refuse;
    }

    /// Hold each connect attempt for `delay` before answering
    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.shared).connect_delay = delay;
    }

    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        lock(&self.shared).attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        lock(&self.shared).attempts.len()
    }
}

/// What the client wrote to a [`MemoryPeer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Text(String),
    Pong(Vec<u8>),
    /// The client closed its write half
    Closed,
}

/// Server end of one loopback socket
///
/// Dropping the peer ends the client's read stream, which the channel
/// treats as an abnormal close.
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<SocketMessage>,
    from_client: mpsc::UnboundedReceiver<PeerEvent>,
}

impl MemoryPeer {
    /// Deliver a raw socket message to the client
    pub fn send(&self, message: SocketMessage) -> bool {
        self.to_client.send(message).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(SocketMessage::Text(text.into()))
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        match frame.encode() {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Close the socket from the server side
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.send(SocketMessage::Close {
            code,
            reason: reason.to_string(),
        })
    }

    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.from_client.try_recv().ok()
    }

    /// Next text frame written by the client, decoded
    ///
    /// Returns `None` once the client has closed.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            match self.from_client.recv().await? {
                PeerEvent::Text(text) => return Frame::decode(&text).ok(),
                PeerEvent::Pong(_) => continue,
                PeerEvent::Closed => return None,
            }
        }
    }

    /// Everything the client has written so far
    pub fn drain(&mut self) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.from_client.try_recv() {
            events.push(event);
        }
        events
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<PeerEvent>>,
}

impl MemorySink {
    fn push(&self, event: PeerEvent) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(event).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.push(PeerEvent::Text(text))
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.push(PeerEvent::Pong(data))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let result = self.push(PeerEvent::Closed);
        self.tx = None;
        result
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<SocketMessage>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let (connector, mut server) = MemoryConnector::new();
        let (mut sink, mut source) = connector.connect("ws://memory/ws").await.unwrap();
        let mut peer = server.accept().await.unwrap();

        sink.send_text("hello".to_string()).await.unwrap();
        assert_eq!(peer.recv().await, Some(PeerEvent::Text("hello".to_string())));

        assert!(peer.send_text("world"));
        assert_eq!(
            source.recv().await.unwrap().unwrap(),
            SocketMessage::Text("world".to_string())
        );

        sink.close().await.unwrap();
        assert_eq!(peer.recv().await, Some(PeerEvent::Closed));
        assert!(matches!(
            sink.send_text("late".to_string()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_refusals_are_recorded() {
        let (connector, server) = MemoryConnector::new();
        server.refuse_next(1);

        assert!(connector.connect("ws://memory/a").await.is_err());
        assert!(connector.connect("ws://memory/b").await.is_ok());

        let attempts = server.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].url, "ws://memory/a");
        assert!(!attempts[0].accepted);
        assert!(attempts[1].accepted);
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_stream() {
        let (connector, mut server) = MemoryConnector::new();
        let (_sink, mut source) = connector.connect("ws://memory/ws").await.unwrap();
        let peer = server.accept().await.unwrap();

        drop(peer);
        assert!(source.recv().await.is_none());
    }
}
