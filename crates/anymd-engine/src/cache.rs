//! TTL-bounded listing cache keyed by `(space_id, category_id)`.
//!
//! Remote listings cost one fetch per category and change rarely
//! relative to browsing; bounded staleness buys materially fewer
//! requests. The TTL comes from configuration, not a constant, since
//! acceptable staleness is a deployment choice. A TTL of zero
//! disables caching entirely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anymd_core::types::ObjectSummary;

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct Entry {
    data: Vec<ObjectSummary>,
    stamped: Instant,
}

pub struct ListingCache {
    entries: Mutex<HashMap<(String, String), Entry>>,
    ttl: Mutex<Duration>,
    clock: Clock,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(Instant::now))
    }

    /// Injectable clock for TTL tests.
    pub fn with_clock(ttl: Duration, clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Mutex::new(ttl),
            clock,
        }
    }

    /// Fresh entry for the key, or `None` when absent, expired, or
    /// caching is disabled (ttl zero).
    pub fn get(&self, space_id: &str, category_id: &str) -> Option<Vec<ObjectSummary>> {
        let ttl = *self.ttl.lock().unwrap();
        if ttl.is_zero() {
            return None;
        }
        let map = self.entries.lock().unwrap();
        let entry = map.get(&(space_id.to_string(), category_id.to_string()))?;
        let age = (self.clock)().saturating_duration_since(entry.stamped);
        if age < ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// Overwrite unconditionally, stamped now. Last write wins.
    pub fn put(&self, space_id: &str, category_id: &str, data: Vec<ObjectSummary>) {
        let mut map = self.entries.lock().unwrap();
        map.insert(
            (space_id.to_string(), category_id.to_string()),
            Entry {
                data,
                stamped: (self.clock)(),
            },
        );
    }

    /// Drop everything. Called on context change and explicit refresh,
    /// before the first post-change read.
    pub fn invalidate_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Replace the TTL at runtime (configuration change).
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    /// Entry length for a fresh key, without cloning the data. Used as
    /// a best-effort child-count hint; never authoritative.
    pub fn peek_len(&self, space_id: &str, category_id: &str) -> Option<usize> {
        let ttl = *self.ttl.lock().unwrap();
        if ttl.is_zero() {
            return None;
        }
        let map = self.entries.lock().unwrap();
        let entry = map.get(&(space_id.to_string(), category_id.to_string()))?;
        let age = (self.clock)().saturating_duration_since(entry.stamped);
        (age < ttl).then_some(entry.data.len())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
