//! Data types held by the telemetry store
//!
//! - `Session` / `SessionPatch`: monitoring sessions handed in by the caller
//! - `DataPoint`: one received measurement set for one device
//! - `ConnectionState` / `ConnectionStatePatch`: field-connection status as
//!   reported by the server
//! - `LinkStatus`: health of our own socket to the server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a monitoring session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// A monitoring session, as returned by the REST collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an idle session stamped with the current time
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: SessionStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method: set status
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update of a session; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub status: Option<SessionStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn apply(&self, session: &mut Session) {
        if let Some(name) = &self.name {
            session.name = name.clone();
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(at) = self.updated_at {
            session.updated_at = at;
        }
    }
}

/// One received measurement set
///
/// Immutable once stored. Buffers keep arrival order; timestamps are not
/// guaranteed to be monotonic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub session_id: String,
    pub device_id: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Measurement name → value
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl DataPoint {
    pub fn new(
        session_id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: i64,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            device_id: device_id.into(),
            timestamp,
            data,
        }
    }

    /// Value of one measurement
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// I/O counters of a field connection, as reported by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionMetrics {
    pub bytes_read: i64,
    pub bytes_written: i64,
    pub read_count: i64,
    pub write_count: i64,
    pub error_count: i64,
    pub last_read: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
    /// Milliseconds
    pub average_latency: f64,
}

/// Snapshot of one field connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    #[serde(default)]
    pub session_id: String,
    pub connection_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metrics: ConnectionMetrics,
}

/// Partial connection update carried in the `data` of a `status` frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatePatch {
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ConnectionMetrics>,
}

impl ConnectionStatePatch {
    pub fn apply(&self, state: &mut ConnectionState) {
        if let Some(session_id) = &self.session_id {
            state.session_id = session_id.clone();
        }
        if let Some(status) = &self.status {
            state.status = status.clone();
        }
        if let Some(metrics) = &self.metrics {
            state.metrics = metrics.clone();
        }
    }

    /// State for a connection not seen before
    pub fn into_state(self) -> ConnectionState {
        ConnectionState {
            session_id: self.session_id.unwrap_or_default(),
            connection_id: self.connection_id,
            status: self.status.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}

/// Health of the socket to the telemetry server
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Reconnect ceiling reached
    Failed { attempts: u32 },
}

impl LinkStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkStatus::Open)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Disconnected => write!(f, "disconnected"),
            LinkStatus::Connecting => write!(f, "connecting"),
            LinkStatus::Open => write!(f, "open"),
            LinkStatus::Reconnecting { attempt, delay_ms } => {
                write!(f, "reconnecting (attempt {} in {}ms)", attempt, delay_ms)
            }
            LinkStatus::Failed { attempts } => write!(f, "failed after {} attempts", attempts),
        }
    }
}
