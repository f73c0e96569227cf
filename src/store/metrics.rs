//! Live metrics mapping
//!
//! Latest value per `deviceId_measurement` key. The store hands out the
//! mapping as `Arc<MetricsMap>`; whether two handles are the same mapping
//! (`Arc::ptr_eq`) is what identity-based observers compare.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use serde_json::Value;

/// Composite key of a metric entry
///
/// Measurements without a device id are keyed by name alone.
pub fn metric_key(device_id: Option<&str>, measurement: &str) -> String {
    match device_id {
        Some(device) => format!("{}_{}", device, measurement),
        None => measurement.to_string(),
    }
}

/// Current value for every metric key
#[derive(Debug, Default)]
pub struct MetricsMap {
    entries: RwLock<HashMap<String, Value>>,
}

impl MetricsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read().clone()
    }

    /// Overwrite one entry without changing the mapping's identity
    pub(crate) fn insert_in_place(&self, key: String, value: Value) {
        self.write().insert(key, value);
    }
}
