//! Transport Channel
//!
//! Owns the one socket to the telemetry server and heals it.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Open
//!      ▲                         │  ▲             │ close / error
//!      │ ceiling reached         │  │ timer       ▼
//!      └──────────────◀──────────┴─ ReconnectWait ◀┘
//! ```
//!
//! The socket, the pending connect future and the reconnect timer all live
//! inside the state variant that needs them. `disconnect()` swaps the state
//! to `Idle` before touching the socket, so a timer can never outlive a
//! deliberate close.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Sleep;

use super::error::{ChannelError, TransportError};
use super::socket::{Connector, FrameSink, FrameSource, SocketHalves, SocketMessage};
use crate::protocol::Frame;

/// Close code used when the socket vanished without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Deadline for one connect attempt unless configured otherwise
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type ConnectFuture = Pin<Box<dyn Future<Output = Result<SocketHalves, TransportError>> + Send>>;

/// Linear reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts before giving up
    pub ceiling: u32,
    /// Delay unit; attempt `n` waits `base_delay × n`
    pub base_delay: Duration,
    /// Deadline for one attempt, handshake included; expiry counts as a
    /// failed attempt
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1000))
    }
}

impl ReconnectPolicy {
    pub fn new(ceiling: u32, base_delay: Duration) -> Self {
        Self {
            ceiling,
            base_delay,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Observable channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    ReconnectWait { attempt: u32 },
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::ReconnectWait { attempt } => write!(f, "reconnect-wait({})", attempt),
        }
    }
}

/// Something that happened on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A connect attempt started (`attempt` 0 = fresh connect)
    Connecting { attempt: u32 },
    Opened,
    /// Raw text payload of one inbound frame
    Frame(String),
    /// Transport-level failure; a `Closed` event follows
    Error(TransportError),
    Closed { code: u16, reason: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Reconnect ceiling reached; no further automatic attempts
    Exhausted { attempts: u32 },
}

enum Link {
    Idle,
    Connecting(ConnectFuture),
    Open {
        sink: Box<dyn FrameSink>,
        source: Box<dyn FrameSource>,
    },
    ReconnectWait {
        attempt: u32,
        timer: Pin<Box<Sleep>>,
    },
}

enum Wake {
    Connected(Result<SocketHalves, TransportError>),
    Inbound(Option<Result<SocketMessage, TransportError>>),
    TimerFired,
}

/// Self-healing connection to one endpoint
pub struct TransportChannel {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    link: Link,
    attempts: u32,
    pending: VecDeque<ChannelEvent>,
    pongs: VecDeque<Vec<u8>>,
}

impl TransportChannel {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, connector: Arc<dyn Connector>) -> Self {
        Self {
            url: url.into(),
            policy,
            connector,
            link: Link::Idle,
            attempts: 0,
            pending: VecDeque::new(),
            pongs: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Consecutive failed attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> ChannelState {
        match &self.link {
            Link::Idle => ChannelState::Disconnected,
            Link::Connecting(_) => ChannelState::Connecting,
            Link::Open { .. } => ChannelState::Open,
            Link::ReconnectWait { attempt, .. } => ChannelState::ReconnectWait { attempt: *attempt },
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.link, Link::Open { .. })
    }

    /// Start connecting
    ///
    /// No-op while open or while an attempt is outstanding. From any other
    /// state the attempt counter restarts at zero and a pending reconnect
    /// timer is dropped in favour of connecting now.
    pub fn connect(&mut self) {
        if matches!(self.link, Link::Open { .. } | Link::Connecting(_)) {
            tracing::debug!(state = %self.state(), "connect ignored");
            return;
        }
        self.attempts = 0;
        self.begin_connect();
    }

    fn begin_connect(&mut self) {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let deadline = self.policy.connect_timeout;
        self.link = Link::Connecting(Box::pin(async move {
            match tokio::time::timeout(deadline, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectFailed(format!(
                    "handshake timed out after {}ms",
                    deadline.as_millis()
                ))),
            }
        }));

        tracing::info!(url = %self.url, attempt = self.attempts, "Connecting to telemetry server");
        self.pending.push_back(ChannelEvent::Connecting {
            attempt: self.attempts,
        });
    }

    /// Close deliberately
    ///
    /// Cancels a pending connect or reconnect timer and closes an open
    /// socket. Never triggers a reconnect. Returns `true` if an open
    /// socket was closed.
    pub async fn disconnect(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.link, Link::Idle);
        self.pending.clear();
        self.pongs.clear();

        match previous {
            Link::Open { mut sink, .. } => {
                if let Err(e) = sink.close().await {
                    tracing::debug!(error = %e, "Close handshake failed");
                }
                tracing::info!(url = %self.url, "Disconnected");
                true
            }
            Link::Connecting(_) => {
                tracing::debug!("Abandoned pending connect");
                false
            }
            Link::ReconnectWait { attempt, .. } => {
                tracing::debug!(attempt, "Cancelled pending reconnect");
                false
            }
            Link::Idle => false,
        }
    }

    /// Write one frame
    ///
    /// Frames are never queued: when the channel is not open the frame is
    /// dropped and [`ChannelError::NotOpen`] is returned.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        if !self.is_open() {
            tracing::warn!(
                kind = %frame.kind,
                state = %self.state(),
                "Channel not open, dropping outbound frame"
            );
            return Err(ChannelError::NotOpen);
        }
        let Link::Open { sink, .. } = &mut self.link else {
            return Err(ChannelError::NotOpen);
        };

        let text = frame.encode()?;
        sink.send_text(text).await?;
        Ok(())
    }

    /// Wait for the next event
    ///
    /// Cancel-safe: all in-flight work (connect future, timer, socket read)
    /// is owned by the channel, so dropping this future loses no event. A
    /// pong interrupted mid-write stays queued and is written again on the
    /// next call. Pends forever while disconnected.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            self.flush_pongs().await;

            let wake = match &mut self.link {
                Link::Idle => std::future::pending::<Wake>().await,
                Link::Connecting(connecting) => Wake::Connected(connecting.as_mut().await),
                Link::Open { source, .. } => Wake::Inbound(source.recv().await),
                Link::ReconnectWait { timer, .. } => {
                    timer.as_mut().await;
                    Wake::TimerFired
                }
            };

            self.on_wake(wake).await;
        }
    }

    async fn on_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Connected(Ok((sink, source))) => {
                self.attempts = 0;
                self.link = Link::Open { sink, source };
                tracing::info!(url = %self.url, "Connected to telemetry server");
                self.pending.push_back(ChannelEvent::Opened);
            }
            Wake::Connected(Err(e)) => {
                tracing::warn!(url = %self.url, error = %e, "Connect attempt failed");
                let reason = e.to_string();
                self.pending.push_back(ChannelEvent::Error(e));
                self.on_lost(ABNORMAL_CLOSURE, reason);
            }
            Wake::Inbound(Some(Ok(message))) => self.on_message(message).await,
            Wake::Inbound(Some(Err(e))) => {
                tracing::error!(error = %e, "Socket error");
                let reason = e.to_string();
                self.pending.push_back(ChannelEvent::Error(e));
                self.on_lost(ABNORMAL_CLOSURE, reason);
            }
            Wake::Inbound(None) => {
                self.on_lost(ABNORMAL_CLOSURE, "stream ended".to_string());
            }
            Wake::TimerFired => self.begin_connect(),
        }
    }

    async fn on_message(&mut self, message: SocketMessage) {
        match message {
            SocketMessage::Text(text) => self.pending.push_back(ChannelEvent::Frame(text)),
            SocketMessage::Binary(data) => match String::from_utf8(data) {
                Ok(text) => self.pending.push_back(ChannelEvent::Frame(text)),
                Err(_) => tracing::warn!("Discarding non UTF-8 binary frame"),
            },
            SocketMessage::Ping(data) => self.pongs.push_back(data),
            SocketMessage::Pong(_) => {}
            SocketMessage::Close { code, reason } => {
                let previous = std::mem::replace(&mut self.link, Link::Idle);
                self.on_lost(code, reason);
                // Complete the close handshake; events are already queued
                if let Link::Open { mut sink, .. } = previous {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Close reply failed");
                    }
                }
            }
        }
    }

    /// Answer queued pings; an entry leaves the queue only once written
    async fn flush_pongs(&mut self) {
        let Link::Open { sink, .. } = &mut self.link else {
            self.pongs.clear();
            return;
        };
        while let Some(data) = self.pongs.front() {
            if let Err(e) = sink.send_pong(data.clone()).await {
                tracing::debug!(error = %e, "Failed to answer ping");
            }
            self.pongs.pop_front();
        }
    }

    /// Non-deliberate close: drop the socket and decide whether to retry
    fn on_lost(&mut self, code: u16, reason: String) {
        self.link = Link::Idle;
        self.pongs.clear();
        tracing::info!(code, reason = %reason, "Connection closed");
        self.pending.push_back(ChannelEvent::Closed { code, reason });

        if self.attempts < self.policy.ceiling {
            self.attempts += 1;
            let delay = self.policy.delay_for(self.attempts);
            tracing::info!(
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.link = Link::ReconnectWait {
                attempt: self.attempts,
                timer: Box::pin(tokio::time::sleep(delay)),
            };
            self.pending.push_back(ChannelEvent::ReconnectScheduled {
                attempt: self.attempts,
                delay,
            });
        } else {
            tracing::error!(
                attempts = self.attempts,
                "Reconnect ceiling reached, giving up"
            );
            self.pending.push_back(ChannelEvent::Exhausted {
                attempts: self.attempts,
            });
        }
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
