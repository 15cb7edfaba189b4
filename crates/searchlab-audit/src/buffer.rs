//! Searchlab Event Buffer
//!
//! Collects keyed observations from request handlers between audit cycles.
//! Producers write into the active map without ever waiting for the
//! flusher; a drain swaps in a fresh map and takes the old one over once
//! the last in-flight producer has let go of it.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

type EventMap = DashMap<String, Vec<Observation>>;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub attribute: String,
}

/// Keyed event buffer with lock-free exchange of the active map.
pub struct EventBuffer {
    active: ArcSwap<EventMap>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self {
            active: ArcSwap::from_pointee(DashMap::new()),
        }
    }

    /// Record an event for `key`, e.g. a user id with the client address.
    pub fn record(&self, key: &str, attribute: &str) {
        let map = self.active.load();
        map.entry(key.to_string()).or_default().push(Observation {
            at: Utc::now(),
            attribute: attribute.to_string(),
        });
    }

    /// Number of keys with buffered events.
    pub fn len(&self) -> usize {
        self.active.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.load().is_empty()
    }

    /// Take all buffered events, ordered by key. Events recorded while the
    /// drain runs land in the next drain.
    pub fn drain(&self) -> BTreeMap<String, Vec<Observation>> {
        let mut previous = self.active.swap(Arc::new(DashMap::new()));
        let map = loop {
            match Arc::try_unwrap(previous) {
                Ok(map) => break map,
                Err(shared) => {
                    previous = shared;
                    std::thread::yield_now();
                }
            }
        };
        map.into_iter().collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer").field("keys", &self.len()).finish()
    }
}
