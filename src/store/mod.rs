//! Telemetry Store
//!
//! Observable in-memory cache of everything the live views show.
//!
//! ## Architecture
//!
//! - **TelemetryStore**: cloneable handle; committed updates bump a revision
//! - **MetricsMap**: latest value per `deviceId_measurement`, with an in-place fast path
//! - **DeviceBuffer**: bounded FIFO of recent data points per device
//! - **Diagnostics**: counters and recent events for absorbed failures

mod buffer;
mod diagnostics;
mod metrics;
mod telemetry;
mod types;

pub use buffer::{DeviceBuffer, DEFAULT_BUFFER_CAPACITY};
pub use diagnostics::{DiagnosticEvent, DiagnosticKind, Diagnostics, RECENT_EVENT_LIMIT};
pub use metrics::{metric_key, MetricsMap};
pub use telemetry::TelemetryStore;
pub use types::{
    ConnectionMetrics, ConnectionState, ConnectionStatePatch, DataPoint, LinkStatus, Session,
    SessionPatch, SessionStatus,
};
