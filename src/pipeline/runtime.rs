//! Pipeline actor
//!
//! One task owns the transport channel, the subscription coordinator and the
//! router. It waits on three sources at once:
//!
//! - the channel's next event (connect result, inbound frame, reconnect timer)
//! - active-session changes published by the store
//! - commands from [`PipelineHandle`]
//!
//! Each event is handled to completion before the next is awaited, so frames
//! reach the router in receive order and control frames keep program order on
//! the wire.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use super::coordinator::SubscriptionCoordinator;
use super::router::{IngestRouter, RouteOutcome};
use crate::config::TransportConfig;
use crate::protocol::Frame;
use crate::store::{DiagnosticKind, LinkStatus, TelemetryStore};
use crate::transport::{ChannelError, ChannelEvent, Connector, ReconnectPolicy, TransportChannel};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline is not running")]
    Stopped,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

enum Command {
    Connect,
    Disconnect {
        reply: oneshot::Sender<bool>,
    },
    Send {
        frame: Frame,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Entry point for starting the live pipeline
pub struct Pipeline;

impl Pipeline {
    /// Spawn the pipeline actor and start connecting to `url`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        store: TelemetryStore,
        connector: Arc<dyn Connector>,
    ) -> PipelineHandle {
        let channel = TransportChannel::new(url, policy, connector);
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = PipelineActor {
            channel,
            coordinator: SubscriptionCoordinator::new(),
            router: IngestRouter::new(store.clone()),
            active: store.watch_active_session(),
            store: store.clone(),
            commands: rx,
        };
        tokio::spawn(actor.run());

        PipelineHandle { commands: tx, store }
    }

    pub fn from_config(
        config: &TransportConfig,
        store: TelemetryStore,
        connector: Arc<dyn Connector>,
    ) -> PipelineHandle {
        Self::spawn(config.url.clone(), config.reconnect_policy(), store, connector)
    }
}

/// Cloneable handle to a running pipeline
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<Command>,
    store: TelemetryStore,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "Connect"),
            Command::Disconnect { .. } => write!(f, "Disconnect"),
            Command::Send { frame, .. } => write!(f, "Send({})", frame.kind),
            Command::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

impl PipelineHandle {
    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn command(&self, command: Command) -> Result<(), PipelineError> {
        self.commands.send(command).map_err(|_| PipelineError::Stopped)
    }

    /// Reconnect after a deliberate close or reconnect exhaustion
    pub fn connect(&self) -> Result<(), PipelineError> {
        self.command(Command::Connect)
    }

    /// Close the socket and stop reconnecting
    ///
    /// Returns whether an open socket was closed.
    pub async fn disconnect(&self) -> Result<bool, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Disconnect { reply })?;
        rx.await.map_err(|_| PipelineError::Stopped)
    }

    /// Write one frame if the channel is open
    pub async fn send(&self, frame: Frame) -> Result<(), PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { frame, reply })?;
        rx.await.map_err(|_| PipelineError::Stopped)??;
        Ok(())
    }

    /// Send a `subscribe` frame directly, bypassing the active session
    pub async fn subscribe(&self, session_id: &str) -> Result<(), PipelineError> {
        self.send(Frame::subscribe(session_id)).await
    }

    /// Send an `unsubscribe` frame directly, bypassing the active session
    pub async fn unsubscribe(&self, session_id: &str) -> Result<(), PipelineError> {
        self.send(Frame::unsubscribe(session_id)).await
    }

    /// Close the socket and stop the actor
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Shutdown { reply })?;
        rx.await.map_err(|_| PipelineError::Stopped)
    }
}

struct PipelineActor {
    channel: TransportChannel,
    coordinator: SubscriptionCoordinator,
    router: IngestRouter,
    store: TelemetryStore,
    active: watch::Receiver<Option<String>>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl PipelineActor {
    async fn run(mut self) {
        let interest = self.active.borrow_and_update().clone();
        self.coordinator.set_interest(interest);
        self.channel.connect();

        loop {
            tokio::select! {
                event = self.channel.next_event() => self.on_channel_event(event).await,
                // The actor holds a store clone, so the sender outlives this loop
                Ok(()) = self.active.changed() => {
                    let interest = self.active.borrow_and_update().clone();
                    tracing::info!(session_id = ?interest, "Active session changed");
                    let frames = self.coordinator.set_interest(interest);
                    self.send_all(frames).await;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.on_command(command).await,
                    None => {
                        self.close().await;
                        break;
                    }
                },
            }
        }

        tracing::info!("Pipeline stopped");
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connecting { .. } => {
                self.store.set_link_status(LinkStatus::Connecting);
            }
            ChannelEvent::Opened => {
                self.store.set_link_status(LinkStatus::Open);
                let frames = self.coordinator.on_open();
                self.send_all(frames).await;
            }
            ChannelEvent::Frame(text) => {
                let outcome = self.router.route(&text);
                if !matches!(outcome, RouteOutcome::Applied { .. }) {
                    tracing::trace!(?outcome, "Frame not applied");
                }
            }
            ChannelEvent::Error(e) => {
                self.store
                    .record_diagnostic(DiagnosticKind::Transport, e.to_string());
            }
            ChannelEvent::Closed { .. } => {
                self.coordinator.on_closed();
                self.store.set_link_status(LinkStatus::Disconnected);
            }
            ChannelEvent::ReconnectScheduled { attempt, delay } => {
                self.store.set_link_status(LinkStatus::Reconnecting {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            ChannelEvent::Exhausted { attempts } => {
                self.store.set_link_status(LinkStatus::Failed { attempts });
                self.store.record_diagnostic(
                    DiagnosticKind::Exhausted,
                    format!("gave up after {} reconnect attempts", attempts),
                );
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.channel.connect(),
            Command::Disconnect { reply } => {
                let closed = self.close().await;
                let _ = reply.send(closed);
            }
            Command::Send { frame, reply } => {
                let result = self.send(&frame).await;
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    async fn close(&mut self) -> bool {
        let closed = self.channel.disconnect().await;
        self.coordinator.on_closed();
        self.store.set_link_status(LinkStatus::Disconnected);
        closed
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        let result = self.channel.send(frame).await;
        if let Err(e) = &result {
            self.store.record_diagnostic(
                DiagnosticKind::SendDropped,
                format!("{} {}: {}", frame.kind, frame.session(), e),
            );
        }
        result
    }

    async fn send_all(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            tracing::debug!(kind = %frame.kind, session_id = frame.session(), "Sending control frame");
            let _ = self.send(&frame).await;
        }
    }
}
