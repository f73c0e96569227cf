//! Transport Channel
//!
//! One persistent, self-healing socket to the telemetry server.
//!
//! ## Architecture
//!
//! - **TransportChannel**: connect / linear-backoff reconnect / send / deliberate close
//! - **Connector, FrameSink, FrameSource**: the socket seam
//! - **WsConnector**: real `ws://` / `wss://` sockets via tokio-tungstenite
//! - **MemoryConnector**: in-process loopback with a scriptable server side
//!
//! The channel is not a task of its own. Its owner drives it by awaiting
//! [`TransportChannel::next_event`] inside a `select!` loop, which keeps every
//! state transition on the owner's task.

mod channel;
mod error;
pub mod memory;
mod socket;
mod ws;

pub use channel::{
    ChannelEvent, ChannelState, ReconnectPolicy, TransportChannel, ABNORMAL_CLOSURE,
};
pub use error::{ChannelError, TransportError};
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer, PeerEvent};
pub use socket::{Connector, FrameSink, FrameSource, SocketHalves, SocketMessage};
pub use ws::WsConnector;
