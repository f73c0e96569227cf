//! Live pipeline
//!
//! Wires the transport channel to the store.
//!
//! ## Architecture
//!
//! - **SubscriptionCoordinator**: which control frames to send, and when
//! - **IngestRouter**: inbound frame → store mutation
//! - **Pipeline / PipelineHandle**: the actor task and its command handle
//!
//! ```text
//! socket ─▶ TransportChannel ─▶ IngestRouter ─▶ TelemetryStore ─▶ views
//!                ▲                                   │
//!                └──── SubscriptionCoordinator ◀─────┘ active session
//! ```

mod coordinator;
mod router;
mod runtime;

pub use coordinator::SubscriptionCoordinator;
pub use router::{IngestRouter, RouteOutcome};
pub use runtime::{Pipeline, PipelineError, PipelineHandle};
