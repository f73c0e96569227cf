//! Bounded per-device FIFO of data points

use std::collections::VecDeque;
use std::sync::Arc;

use super::types::DataPoint;

/// Points kept per device unless configured otherwise
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// The most recent points received for one device, oldest first
///
/// Append-only apart from eviction, which always removes from the front.
/// Points are shared, so cloning a buffer copies pointers, not payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer {
    points: VecDeque<Arc<DataPoint>>,
    capacity: usize,
}

impl Default for DeviceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl DeviceBuffer {
    /// Create an empty buffer; capacity is at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, returning the one evicted to make room
    pub fn push(&mut self, point: impl Into<Arc<DataPoint>>) -> Option<Arc<DataPoint>> {
        let evicted = if self.points.len() >= self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point.into());
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&DataPoint> {
        self.points.get(index).map(Arc::as_ref)
    }

    pub fn oldest(&self) -> Option<&DataPoint> {
        self.points.front().map(Arc::as_ref)
    }

    pub fn latest(&self) -> Option<&DataPoint> {
        self.points.back().map(Arc::as_ref)
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.iter().map(Arc::as_ref)
    }

    /// Oldest to newest, as the shared handles held by the buffer
    pub fn shared(&self) -> impl Iterator<Item = &Arc<DataPoint>> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<DataPoint> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn point(i: i64) -> DataPoint {
        let mut data = Map::new();
        data.insert("value".into(), json!(i));
        DataPoint::new("s-1", "d-1", 1704067200000 + i * 1000, data)
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut buffer = DeviceBuffer::new(3);
        assert!(buffer.push(point(1)).is_none());
        assert!(buffer.push(point(2)).is_none());
        assert!(buffer.push(point(3)).is_none());

        let evicted = buffer.push(point(4)).unwrap();
        assert_eq!(*evicted, point(1));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest(), Some(&point(2)));
        assert_eq!(buffer.latest(), Some(&point(4)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = DeviceBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(point(1));
        buffer.push(point(2));
        assert_eq!(buffer.to_vec(), vec![point(2)]);
    }

    #[test]
    fn test_clone_shares_points() {
        let mut buffer = DeviceBuffer::new(3);
        buffer.push(point(1));
        buffer.push(point(2));

        let mut next = buffer.clone();
        next.push(point(3));

        for (a, b) in buffer.shared().zip(next.shared()) {
            assert!(Arc::ptr_eq(a, b));
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(next.len(), 3);
    }

    #[test]
    fn test_arrival_order_kept() {
        let mut buffer = DeviceBuffer::default();
        // Out-of-order timestamps stay in arrival order
        buffer.push(point(5));
        buffer.push(point(1));
        let timestamps: Vec<i64> = buffer.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![1704067205000, 1704067201000]);
        assert_eq!(buffer.capacity(), DEFAULT_BUFFER_CAPACITY);
    }
}
