//! # IoT Studio Live
//!
//! Client side of IoT Studio's real-time telemetry: a self-healing socket to
//! the telemetry server, session subscriptions that follow the active session,
//! and an observable cache of the latest measurements.
//!
//! ## Features
//!
//! - **Resilient transport**: linear-backoff reconnect with a ceiling
//! - **Subscriptions**: unsubscribe/subscribe on session switch, resubscribe on reconnect
//! - **Live cache**: fast-path metrics plus bounded per-device history
//!
//! ## Modules
//!
//! - [`protocol`]: Wire frame format
//! - [`transport`]: Transport channel and socket connectors
//! - [`store`]: Telemetry store
//! - [`pipeline`]: Subscription coordinator, ingest router and the actor tying them together
//! - [`api`]: REST client for the session list
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iotstudio_live::config::Config;
//! use iotstudio_live::pipeline::Pipeline;
//! use iotstudio_live::store::TelemetryStore;
//! use iotstudio_live::transport::WsConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default()?;
//!     let store = TelemetryStore::new(config.store.clone());
//!
//!     // Connects immediately and subscribes once a session is active
//!     let pipeline = Pipeline::from_config(&config.transport, store.clone(), Arc::new(WsConnector::new()));
//!     store.set_active_session(Some("session-1"));
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     println!("temperature: {:?}", store.metric("plc-1_temperature"));
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod store;
pub mod transport;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError};
pub use pipeline::{IngestRouter, Pipeline, PipelineError, PipelineHandle, RouteOutcome, SubscriptionCoordinator};
pub use protocol::{Frame, FrameError, FrameType};
pub use store::{DataPoint, LinkStatus, Session, TelemetryStore};
pub use transport::{ChannelEvent, ChannelState, ReconnectPolicy, TransportChannel, WsConnector};
