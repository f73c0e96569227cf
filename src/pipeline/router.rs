//! Ingest Router
//!
//! Interprets each inbound text frame and applies it to the store.

use serde_json::Value;

use crate::protocol::{Frame, FrameType};
use crate::store::{
    metric_key, ConnectionStatePatch, DataPoint, DiagnosticKind, TelemetryStore,
};

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Data for the active session: `metrics` entries fast-path updated,
    /// `buffered` if a point was appended to a device buffer
    Applied { metrics: usize, buffered: bool },
    /// Data for a session that is not active; dropped
    Inactive,
    /// Server-reported error, recorded in diagnostics
    ServerError,
    /// Connection state merged into the store
    StatusPatched,
    /// Echo of a subscribe/unsubscribe control frame
    Acknowledged,
    /// Missing or unrecognised type; dropped
    Unknown,
    /// Not a valid frame; dropped
    Malformed,
}

#[derive(Debug, Clone)]
pub struct IngestRouter {
    store: TelemetryStore,
}

impl IngestRouter {
    pub fn new(store: TelemetryStore) -> Self {
        Self { store }
    }

    /// Decode and apply one raw frame
    pub fn route(&self, raw: &str) -> RouteOutcome {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable frame");
                self.store.record_diagnostic(DiagnosticKind::Decode, e.to_string());
                return RouteOutcome::Malformed;
            }
        };

        match frame.kind {
            FrameType::Data => self.route_data(frame),
            FrameType::Error => {
                let message = frame
                    .error
                    .unwrap_or_else(|| "unspecified server error".to_string());
                tracing::error!(session_id = ?frame.session_id, "Server error: {}", message);
                self.store.record_diagnostic(DiagnosticKind::ServerError, message);
                RouteOutcome::ServerError
            }
            FrameType::Status => self.route_status(frame),
            FrameType::Subscribe | FrameType::Unsubscribe => {
                tracing::debug!(kind = %frame.kind, session_id = frame.session(), "Control frame echoed");
                RouteOutcome::Acknowledged
            }
            FrameType::Unknown => {
                tracing::debug!("Dropping frame of unknown type");
                self.store
                    .record_diagnostic(DiagnosticKind::UnknownFrame, truncate(raw, 120));
                RouteOutcome::Unknown
            }
        }
    }

    fn route_data(&self, frame: Frame) -> RouteOutcome {
        let Some(session_id) = frame
            .session_id
            .filter(|id| self.store.is_active_session(id))
        else {
            self.store.count_inactive_frame();
            return RouteOutcome::Inactive;
        };

        let data = frame.data.unwrap_or_default();
        let device_id = frame.device_id;

        for (name, value) in &data {
            self.store
                .set_metric_fast(metric_key(device_id.as_deref(), name), value.clone());
        }
        let metrics = data.len();

        let buffered = match device_id {
            Some(device_id) => {
                let point = DataPoint::new(session_id, device_id.clone(), frame.timestamp, data);
                self.store.append_data_point(&device_id, point);
                true
            }
            None => false,
        };

        RouteOutcome::Applied { metrics, buffered }
    }

    fn route_status(&self, frame: Frame) -> RouteOutcome {
        let Some(data) = frame.data else {
            tracing::warn!("Status frame without data");
            self.store
                .record_diagnostic(DiagnosticKind::Decode, "status frame without data");
            return RouteOutcome::Malformed;
        };

        match serde_json::from_value::<ConnectionStatePatch>(Value::Object(data)) {
            Ok(mut patch) => {
                if patch.session_id.is_none() {
                    patch.session_id = frame.session_id;
                }
                tracing::debug!(connection_id = %patch.connection_id, "Connection status update");
                self.store.update_connection(patch);
                RouteOutcome::StatusPatched
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid status frame");
                self.store
                    .record_diagnostic(DiagnosticKind::Decode, format!("status frame: {}", e));
                RouteOutcome::Malformed
            }
        }
    }
}

fn truncate(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &raw[..index]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Session;
    use serde_json::json;
    use std::sync::Arc;

    fn router_with_active(active: &str) -> (IngestRouter, TelemetryStore) {
        let store = TelemetryStore::default();
        store.set_sessions(vec![Session::new(active, "Active")]);
        store.set_active_session(Some(active));
        (IngestRouter::new(store.clone()), store)
    }

    #[test]
    fn test_data_frame_updates_metrics_and_buffer() {
        let (router, store) = router_with_active("s-1");
        let metrics_before = store.metrics();

        let outcome = router.route(
            r#"{"type":"data","sessionId":"s-1","deviceId":"plc-1","timestamp":1704067200000,
                "data":{"temp":21.5,"pressure":1.01}}"#,
        );

        assert_eq!(outcome, RouteOutcome::Applied { metrics: 2, buffered: true });
        assert_eq!(store.metric("plc-1_temp"), Some(json!(21.5)));
        assert_eq!(store.metric("plc-1_pressure"), Some(json!(1.01)));
        // Metrics went through the fast path
        assert!(Arc::ptr_eq(&metrics_before, &store.metrics()));

        let buffer = store.data_points("plc-1");
        assert_eq!(buffer.len(), 1);
        let point = buffer.latest().unwrap();
        assert_eq!(point.session_id, "s-1");
        assert_eq!(point.timestamp, 1704067200000);
        assert_eq!(point.value("temp"), Some(&json!(21.5)));
    }

    #[test]
    fn test_data_frame_with_fractional_timestamp() {
        let (router, store) = router_with_active("s-1");

        let outcome = router.route(
            r#"{"type":"data","sessionId":"s-1","deviceId":"d","timestamp":1704067200000.5,"data":{"t":1}}"#,
        );

        assert_eq!(outcome, RouteOutcome::Applied { metrics: 1, buffered: true });
        assert_eq!(store.metric("d_t"), Some(json!(1)));
        assert_eq!(store.data_points("d").latest().unwrap().timestamp, 1704067200000);
        assert_eq!(store.diagnostics().decode_errors, 0);
    }

    #[test]
    fn test_data_frame_for_inactive_session_changes_nothing() {
        let (router, store) = router_with_active("s-1");
        let revision = store.revision();
        let metrics_before = store.metrics();
        let buffers_before = store.device_buffers();

        let outcome = router.route(
            r#"{"type":"data","sessionId":"s-2","deviceId":"plc-1","timestamp":1,"data":{"temp":99}}"#,
        );

        assert_eq!(outcome, RouteOutcome::Inactive);
        assert!(store.metrics().is_empty());
        assert!(Arc::ptr_eq(&metrics_before, &store.metrics()));
        assert!(Arc::ptr_eq(&buffers_before, &store.device_buffers()));
        assert!(store.data_points("plc-1").is_empty());
        assert_eq!(store.revision(), revision);
        assert_eq!(store.diagnostics().inactive_frames, 1);
    }

    #[test]
    fn test_data_frame_without_active_session_is_dropped() {
        let store = TelemetryStore::default();
        let router = IngestRouter::new(store.clone());

        let outcome =
            router.route(r#"{"type":"data","sessionId":"s-1","timestamp":1,"data":{"t":1}}"#);
        assert_eq!(outcome, RouteOutcome::Inactive);
        assert!(store.metrics().is_empty());
    }

    #[test]
    fn test_data_frame_without_device_updates_metrics_only() {
        let (router, store) = router_with_active("s-1");

        let outcome =
            router.route(r#"{"type":"data","sessionId":"s-1","timestamp":1,"data":{"uptime":42}}"#);

        assert_eq!(outcome, RouteOutcome::Applied { metrics: 1, buffered: false });
        assert_eq!(store.metric("uptime"), Some(json!(42)));
        assert!(store.device_ids().is_empty());
    }

    #[test]
    fn test_error_frame_goes_to_diagnostics() {
        let (router, store) = router_with_active("s-1");
        let revision = store.revision();

        let outcome =
            router.route(r#"{"type":"error","timestamp":1,"error":"device plc-1 offline"}"#);

        assert_eq!(outcome, RouteOutcome::ServerError);
        let diag = store.diagnostics();
        assert_eq!(diag.server_errors, 1);
        assert_eq!(diag.last().unwrap().message, "device plc-1 offline");
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_status_frame_patches_connection() {
        let (router, store) = router_with_active("s-1");

        let outcome = router.route(
            r#"{"type":"status","sessionId":"s-1","timestamp":1,
                "data":{"connectionId":"c-1","status":"connected",
                        "metrics":{"bytesRead":10,"averageLatency":3.5}}}"#,
        );
        assert_eq!(outcome, RouteOutcome::StatusPatched);

        router.route(
            r#"{"type":"status","timestamp":2,"data":{"connectionId":"c-1","status":"error"}}"#,
        );

        let connection = store.connection("c-1").unwrap();
        assert_eq!(connection.status, "error");
        assert_eq!(connection.session_id, "s-1");
        assert_eq!(connection.metrics.bytes_read, 10);
        assert_eq!(connection.metrics.average_latency, 3.5);
    }

    #[test]
    fn test_status_frame_without_connection_id_is_malformed() {
        let (router, store) = router_with_active("s-1");
        let outcome = router.route(r#"{"type":"status","timestamp":1,"data":{"status":"up"}}"#);
        assert_eq!(outcome, RouteOutcome::Malformed);
        assert!(store.connections().is_empty());
        assert_eq!(store.diagnostics().decode_errors, 1);
    }

    #[test]
    fn test_unknown_and_malformed_frames_are_counted() {
        let (router, store) = router_with_active("s-1");

        assert_eq!(router.route(r#"{"type":"heartbeat","timestamp":1}"#), RouteOutcome::Unknown);
        assert_eq!(router.route(r#"{"timestamp":1}"#), RouteOutcome::Unknown);
        assert_eq!(router.route("not json"), RouteOutcome::Malformed);
        assert_eq!(router.route(r#"{"type":"data"}"#), RouteOutcome::Malformed);

        let diag = store.diagnostics();
        assert_eq!(diag.unknown_frames, 2);
        assert_eq!(diag.decode_errors, 2);
    }

    #[test]
    fn test_control_echo_is_acknowledged() {
        let (router, _store) = router_with_active("s-1");
        let outcome = router.route(r#"{"type":"subscribe","sessionId":"s-1","timestamp":1}"#);
        assert_eq!(outcome, RouteOutcome::Acknowledged);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
