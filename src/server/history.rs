use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use super::routes::Endpoint;

/// Bounded rolling window of recorded ticks for one endpoint. Oldest
/// points fall off first; this is the chart-backing data source, not an
/// archive.
#[derive(Debug)]
pub struct TimelineStore {
    points: VecDeque<Value>,
    capacity: usize,
}

impl TimelineStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Value) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.points.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One rolling window per served endpoint.
#[derive(Debug)]
pub struct HistoryBook {
    windows: HashMap<Endpoint, TimelineStore>,
}

impl HistoryBook {
    pub fn new(routes: &[Endpoint], capacity: usize) -> Self {
        Self {
            windows: routes
                .iter()
                .map(|&e| (e, TimelineStore::new(capacity)))
                .collect(),
        }
    }

    pub fn record(&mut self, endpoint: Endpoint, point: Value) {
        if let Some(window) = self.windows.get_mut(&endpoint) {
            window.push(point);
        }
    }

    pub fn snapshot(&self, endpoint: Endpoint) -> Vec<Value> {
        self.windows
            .get(&endpoint)
            .map(TimelineStore::snapshot)
            .unwrap_or_default()
    }
}
