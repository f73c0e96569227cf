//! Telemetry Store
//!
//! The observable cache behind every live view: sessions, the active
//! session, live metrics, per-device buffers, connection states, link status
//! and diagnostics.
//!
//! ## Update paths
//!
//! Every mutation except [`TelemetryStore::set_metric_fast`] is a *committed*
//! update: the affected value is replaced with a new `Arc` and the revision
//! published by [`TelemetryStore::subscribe`] is bumped exactly once.
//!
//! `set_metric_fast` writes into the current [`MetricsMap`] in place. The
//! `Arc` handed out by [`TelemetryStore::metrics`] stays the same and no
//! revision is published, so identity-based observers do not see the change
//! until the next committed metric update. Callers that want every tick must
//! poll `metric()`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::sync::watch;

use super::buffer::DeviceBuffer;
use super::diagnostics::{DiagnosticKind, Diagnostics};
use super::metrics::MetricsMap;
use super::types::{ConnectionState, ConnectionStatePatch, DataPoint, LinkStatus, Session, SessionPatch};
use crate::config::StoreConfig;

type DeviceBuffers = HashMap<String, Arc<DeviceBuffer>>;

#[derive(Debug, Default)]
struct StoreState {
    sessions: Vec<Session>,
    active_session_id: Option<String>,
    active_session: Option<Session>,
    metrics: Arc<MetricsMap>,
    buffers: Arc<DeviceBuffers>,
    connections: Arc<Vec<ConnectionState>>,
    link: LinkStatus,
    diagnostics: Diagnostics,
}

#[derive(Debug)]
struct StoreInner {
    buffer_capacity: usize,
    state: RwLock<StoreState>,
    revision: watch::Sender<u64>,
    active: watch::Sender<Option<String>>,
}

/// Shared handle to one telemetry store
///
/// Cloning is cheap and every clone sees the same state.
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    inner: Arc<StoreInner>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl TelemetryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_capacity(config.buffer_capacity)
    }

    /// Store keeping `buffer_capacity` points per device (at least 1)
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        let (revision, _) = watch::channel(0);
        let (active, _) = watch::channel(None);
        Self {
            inner: Arc::new(StoreInner {
                buffer_capacity: buffer_capacity.max(1),
                state: RwLock::new(StoreState::default()),
                revision,
                active,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }

    fn publish_active(&self, id: Option<String>) {
        self.inner.active.send_if_modified(|current| {
            if *current == id {
                false
            } else {
                *current = id;
                true
            }
        });
    }

    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    /// Drop all state, as on logout or when switching backends
    pub fn reset(&self) {
        *self.write() = StoreState::default();
        self.publish_active(None);
        self.commit();
    }

    /// Revision counter, bumped once per committed update
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Active session id, published whenever it changes
    pub fn watch_active_session(&self) -> watch::Receiver<Option<String>> {
        self.inner.active.subscribe()
    }

    // Sessions

    pub fn sessions(&self) -> Vec<Session> {
        self.read().sessions.clone()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.read().sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Replace the session list
    ///
    /// The active session object is re-resolved from the new list; the
    /// active id is kept even if the list no longer contains it.
    pub fn set_sessions(&self, sessions: Vec<Session>) {
        {
            let mut state = self.write();
            let active = state
                .active_session_id
                .as_ref()
                .and_then(|id| sessions.iter().find(|s| &s.id == id).cloned());
            state.active_session = active;
            state.sessions = sessions;
        }
        self.commit();
    }

    /// Add a session, replacing any session with the same id
    pub fn add_session(&self, session: Session) {
        {
            let mut state = self.write();
            if state.active_session_id.as_deref() == Some(session.id.as_str()) {
                state.active_session = Some(session.clone());
            }
            match state.sessions.iter().position(|s| s.id == session.id) {
                Some(index) => state.sessions[index] = session,
                None => state.sessions.push(session),
            }
        }
        self.commit();
    }

    /// Patch a session by id; returns false if no such session exists
    pub fn update_session(&self, id: &str, patch: SessionPatch) -> bool {
        {
            let mut state = self.write();
            let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) else {
                return false;
            };
            patch.apply(session);
            let updated = session.clone();
            if state.active_session_id.as_deref() == Some(id) {
                state.active_session = Some(updated);
            }
        }
        self.commit();
        true
    }

    /// Remove a session; removing the active session clears the active id too
    pub fn remove_session(&self, id: &str) -> Option<Session> {
        let (removed, was_active) = {
            let mut state = self.write();
            let index = state.sessions.iter().position(|s| s.id == id)?;
            let removed = state.sessions.remove(index);
            let was_active = state.active_session_id.as_deref() == Some(id);
            if was_active {
                state.active_session_id = None;
                state.active_session = None;
            }
            (removed, was_active)
        };
        if was_active {
            self.publish_active(None);
        }
        self.commit();
        Some(removed)
    }

    /// Select the session whose data is routed into the live views
    pub fn set_active_session(&self, id: Option<&str>) {
        {
            let mut state = self.write();
            let active = id.and_then(|id| state.sessions.iter().find(|s| s.id == id).cloned());
            state.active_session = active;
            state.active_session_id = id.map(str::to_string);
        }
        self.publish_active(id.map(str::to_string));
        self.commit();
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.read().active_session_id.clone()
    }

    pub fn active_session(&self) -> Option<Session> {
        self.read().active_session.clone()
    }

    pub fn is_active_session(&self, id: &str) -> bool {
        self.read().active_session_id.as_deref() == Some(id)
    }

    // Metrics

    /// Current metrics mapping
    pub fn metrics(&self) -> Arc<MetricsMap> {
        Arc::clone(&self.read().metrics)
    }

    pub fn metric(&self, key: &str) -> Option<Value> {
        self.read().metrics.get(key)
    }

    /// Committed metric update: publishes a new mapping containing the change
    pub fn set_metric(&self, key: impl Into<String>, value: Value) {
        {
            let mut state = self.write();
            let mut entries = state.metrics.snapshot();
            entries.insert(key.into(), value);
            state.metrics = Arc::new(MetricsMap::from_entries(entries));
        }
        self.commit();
    }

    /// Fast-path metric update: in place, same mapping, no notification
    pub fn set_metric_fast(&self, key: impl Into<String>, value: Value) {
        self.read().metrics.insert_in_place(key.into(), value);
    }

    // Device buffers

    /// Append a point to a device's buffer, evicting the oldest at capacity
    ///
    /// Publishes a new buffer `Arc`; the retained points are shared with the
    /// previous buffer rather than copied.
    pub fn append_data_point(&self, device_id: &str, point: DataPoint) {
        {
            let mut state = self.write();
            let mut buffer = match state.buffers.get(device_id) {
                Some(existing) => (**existing).clone(),
                None => DeviceBuffer::new(self.inner.buffer_capacity),
            };
            buffer.push(point);

            let mut buffers = (*state.buffers).clone();
            buffers.insert(device_id.to_string(), Arc::new(buffer));
            state.buffers = Arc::new(buffers);
        }
        self.commit();
    }

    /// Buffer of one device; empty if nothing was received for it
    pub fn data_points(&self, device_id: &str) -> Arc<DeviceBuffer> {
        self.read()
            .buffers
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(DeviceBuffer::new(self.inner.buffer_capacity)))
    }

    pub fn device_buffers(&self) -> Arc<HashMap<String, Arc<DeviceBuffer>>> {
        Arc::clone(&self.read().buffers)
    }

    /// Sorted ids of devices with buffered data
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().buffers.keys().cloned().collect();
        ids.sort();
        ids
    }

    // Connections

    pub fn connections(&self) -> Arc<Vec<ConnectionState>> {
        Arc::clone(&self.read().connections)
    }

    pub fn connection(&self, connection_id: &str) -> Option<ConnectionState> {
        self.read()
            .connections
            .iter()
            .find(|c| c.connection_id == connection_id)
            .cloned()
    }

    pub fn set_connections(&self, connections: Vec<ConnectionState>) {
        self.write().connections = Arc::new(connections);
        self.commit();
    }

    /// Merge a patch into the connection with the same id, or add it
    pub fn update_connection(&self, patch: ConnectionStatePatch) {
        {
            let mut state = self.write();
            let mut connections = state.connections.to_vec();
            match connections
                .iter_mut()
                .find(|c| c.connection_id == patch.connection_id)
            {
                Some(existing) => patch.apply(existing),
                None => connections.push(patch.into_state()),
            }
            state.connections = Arc::new(connections);
        }
        self.commit();
    }

    // Link status

    pub fn link_status(&self) -> LinkStatus {
        self.read().link
    }

    /// Returns whether the status changed
    pub fn set_link_status(&self, status: LinkStatus) -> bool {
        {
            let mut state = self.write();
            if state.link == status {
                return false;
            }
            state.link = status;
        }
        self.commit();
        true
    }

    // Diagnostics
    //
    // Diagnostics are polled; recording one does not bump the revision.

    pub fn diagnostics(&self) -> Diagnostics {
        self.read().diagnostics.clone()
    }

    pub fn record_diagnostic(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.write().diagnostics.record(kind, message);
    }

    pub(crate) fn count_inactive_frame(&self) {
        self.write().diagnostics.inactive_frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{ConnectionMetrics, SessionStatus};
    use serde_json::{json, Map};

    fn point(device: &str, n: i64) -> DataPoint {
        let mut data = Map::new();
        data.insert("seq".into(), json!(n));
        DataPoint::new("s-1", device, 1704067200000 + n, data)
    }

    #[test]
    fn test_buffer_keeps_most_recent_hundred() {
        let store = TelemetryStore::default();
        for n in 1..=150 {
            store.append_data_point("plc-1", point("plc-1", n));
        }

        let buffer = store.data_points("plc-1");
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.oldest().unwrap().value("seq"), Some(&json!(51)));
        assert_eq!(buffer.latest().unwrap().value("seq"), Some(&json!(150)));

        let seqs: Vec<i64> = buffer
            .iter()
            .map(|p| p.value("seq").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(seqs, (51..=150).collect::<Vec<_>>());
    }

    #[test]
    fn test_buffer_len_below_capacity() {
        let store = TelemetryStore::default();
        for n in 1..=7 {
            store.append_data_point("plc-1", point("plc-1", n));
        }
        assert_eq!(store.data_points("plc-1").len(), 7);
        assert!(store.data_points("unknown").is_empty());
        assert_eq!(store.device_ids(), vec!["plc-1"]);
    }

    #[test]
    fn test_append_replaces_buffer() {
        let store = TelemetryStore::with_capacity(10);
        store.append_data_point("plc-1", point("plc-1", 1));
        let before = store.data_points("plc-1");
        let map_before = store.device_buffers();

        store.append_data_point("plc-1", point("plc-1", 2));

        // Earlier snapshots are untouched
        assert_eq!(before.len(), 1);
        assert!(!Arc::ptr_eq(&before, &store.data_points("plc-1")));
        assert!(!Arc::ptr_eq(&map_before, &store.device_buffers()));
        assert_eq!(store.data_points("plc-1").capacity(), 10);
    }

    #[test]
    fn test_append_shares_retained_points() {
        let store = TelemetryStore::with_capacity(3);
        for n in 1..=3 {
            store.append_data_point("plc-1", point("plc-1", n));
        }
        let before = store.data_points("plc-1");

        store.append_data_point("plc-1", point("plc-1", 4));
        let after = store.data_points("plc-1");

        // Point 1 was evicted; points 2 and 3 are the same allocations
        let kept: Vec<&Arc<DataPoint>> = before.shared().skip(1).collect();
        let retained: Vec<&Arc<DataPoint>> = after.shared().take(2).collect();
        assert_eq!(kept.len(), 2);
        for (a, b) in kept.iter().zip(retained.iter()) {
            assert!(Arc::ptr_eq(a, b));
        }
        assert_eq!(after.latest().unwrap().value("seq"), Some(&json!(4)));
    }

    #[test]
    fn test_set_metric_replaces_mapping() {
        let store = TelemetryStore::default();
        let mut rx = store.subscribe();
        let before = store.metrics();

        store.set_metric("plc-1_temp", json!(21.5));

        assert_eq!(store.metric("plc-1_temp"), Some(json!(21.5)));
        assert!(!Arc::ptr_eq(&before, &store.metrics()));
        assert!(before.is_empty());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn test_fast_path_keeps_identity_until_commit() {
        let store = TelemetryStore::default();
        let mut rx = store.subscribe();
        let before = store.metrics();

        store.set_metric_fast("plc-1_temp", json!(20.0));
        store.set_metric_fast("plc-1_temp", json!(20.5));

        // Visible by lookup, invisible to identity observers
        assert_eq!(store.metric("plc-1_temp"), Some(json!(20.5)));
        assert!(Arc::ptr_eq(&before, &store.metrics()));
        assert_eq!(before.get("plc-1_temp"), Some(json!(20.5)));
        assert!(!rx.has_changed().unwrap());

        store.set_metric("plc-1_pressure", json!(1.2));

        let after = store.metrics();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.get("plc-1_temp"), Some(json!(20.5)));
        assert_eq!(after.get("plc-1_pressure"), Some(json!(1.2)));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_session_crud() {
        let store = TelemetryStore::default();
        store.set_sessions(vec![Session::new("a", "Line A"), Session::new("b", "Line B")]);
        store.add_session(Session::new("c", "Line C"));
        store.add_session(Session::new("a", "Line A2"));

        let names: Vec<String> = store.sessions().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Line A2", "Line B", "Line C"]);

        assert!(store.update_session("b", SessionPatch::new().status(SessionStatus::Running)));
        assert_eq!(store.session("b").unwrap().status, SessionStatus::Running);
        assert!(!store.update_session("missing", SessionPatch::new().name("x")));

        assert_eq!(store.remove_session("c").unwrap().name, "Line C");
        assert!(store.remove_session("c").is_none());
        assert_eq!(store.sessions().len(), 2);
    }

    #[test]
    fn test_active_session_tracks_list() {
        let store = TelemetryStore::default();
        let mut active = store.watch_active_session();
        store.set_sessions(vec![Session::new("a", "Line A")]);

        store.set_active_session(Some("a"));
        assert!(active.has_changed().unwrap());
        assert_eq!(*active.borrow_and_update(), Some("a".to_string()));
        assert_eq!(store.active_session().unwrap().name, "Line A");
        assert!(store.is_active_session("a"));

        store.update_session("a", SessionPatch::new().name("Renamed"));
        assert_eq!(store.active_session().unwrap().name, "Renamed");

        // Same id again is not republished
        store.set_active_session(Some("a"));
        assert!(!active.has_changed().unwrap());

        store.remove_session("a");
        assert!(store.active_session_id().is_none());
        assert!(store.active_session().is_none());
        assert_eq!(*active.borrow_and_update(), None);
    }

    #[test]
    fn test_active_session_unknown_id() {
        let store = TelemetryStore::default();
        store.set_active_session(Some("later"));
        assert_eq!(store.active_session_id().as_deref(), Some("later"));
        assert!(store.active_session().is_none());

        store.set_sessions(vec![Session::new("later", "Arrived")]);
        assert_eq!(store.active_session().unwrap().name, "Arrived");
    }

    #[test]
    fn test_update_connection_upserts() {
        let store = TelemetryStore::default();
        store.set_connections(vec![ConnectionState {
            session_id: "s-1".into(),
            connection_id: "c-1".into(),
            status: "connecting".into(),
            metrics: ConnectionMetrics::default(),
        }]);

        store.update_connection(ConnectionStatePatch {
            connection_id: "c-1".into(),
            session_id: None,
            status: Some("connected".into()),
            metrics: None,
        });
        store.update_connection(ConnectionStatePatch {
            connection_id: "c-2".into(),
            session_id: Some("s-1".into()),
            status: Some("error".into()),
            metrics: None,
        });

        let connections = store.connections();
        assert_eq!(connections.len(), 2);
        assert_eq!(store.connection("c-1").unwrap().status, "connected");
        assert_eq!(store.connection("c-1").unwrap().session_id, "s-1");
        assert_eq!(store.connection("c-2").unwrap().status, "error");
    }

    #[test]
    fn test_link_status_commits_only_on_change() {
        let store = TelemetryStore::default();
        let start = store.revision();

        assert!(store.set_link_status(LinkStatus::Connecting));
        assert!(!store.set_link_status(LinkStatus::Connecting));
        assert!(store.set_link_status(LinkStatus::Open));
        assert_eq!(store.revision(), start + 2);
        assert!(store.link_status().is_open());
    }

    #[test]
    fn test_diagnostics_do_not_commit() {
        let store = TelemetryStore::default();
        let rx = store.subscribe();

        store.record_diagnostic(DiagnosticKind::Decode, "expected value at line 1");
        store.count_inactive_frame();

        assert!(!rx.has_changed().unwrap());
        let diag = store.diagnostics();
        assert_eq!(diag.decode_errors, 1);
        assert_eq!(diag.inactive_frames, 1);
    }

    #[test]
    fn test_reset() {
        let store = TelemetryStore::default();
        let clone = store.clone();
        let mut active = store.watch_active_session();

        store.set_sessions(vec![Session::new("a", "Line A")]);
        store.set_active_session(Some("a"));
        active.borrow_and_update();
        store.set_metric("k", json!(1));
        store.append_data_point("plc-1", point("plc-1", 1));
        store.set_link_status(LinkStatus::Open);

        clone.reset();

        assert!(store.sessions().is_empty());
        assert!(store.active_session_id().is_none());
        assert!(store.metrics().is_empty());
        assert!(store.device_ids().is_empty());
        assert_eq!(store.link_status(), LinkStatus::Disconnected);
        assert_eq!(*active.borrow_and_update(), None);
    }
}
