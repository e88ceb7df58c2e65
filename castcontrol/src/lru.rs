//! Bounded LRU of processed description locations.
//!
//! SSDP devices re-announce aggressively (some send dozens of NOTIFYs
//! per second). This structure decides whether an announce deserves a
//! description fetch or only a liveness touch, and it caps its own
//! memory: the oldest location falls out once capacity is reached.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub(crate) struct ProcessedLocations {
    capacity: usize,
    entries: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl ProcessedLocations {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Decide whether `location` should be processed now and mark it if
    /// so. Returns `false` when the location was already processed
    /// within `window`.
    pub(crate) fn should_process(&mut self, location: &str, window: Duration) -> bool {
        let now = Instant::now();

        if let Some(processed_at) = self.entries.get(location) {
            if now.duration_since(*processed_at) < window {
                return false;
            }
            self.entries.insert(location.to_string(), now);
            self.move_to_back(location);
            return true;
        }

        self.entries.insert(location.to_string(), now);
        self.order.push_back(location.to_string());
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
        true
    }

    /// Forget a location so the next announce triggers a fetch again
    /// (transient fetch failure, byebye, liveness eviction).
    pub(crate) fn forget(&mut self, location: &str) {
        if self.entries.remove(location).is_some() {
            self.order.retain(|l| l != location);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn move_to_back(&mut self, location: &str) {
        self.order.retain(|l| l != location);
        self.order.push_back(location.to_string());
    }
}
