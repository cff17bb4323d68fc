//! Shared keyed state store
//!
//! The one shared mutable resource in the system: the input thread, the
//! allocation tick, and the control channel all read and write it. Every
//! read returns a snapshot copy, so no caller can observe a half-written
//! composite update. Keys set in the same call carry no ordering
//! guarantee for a concurrent reader beyond last-write-wins per key.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::protocol::TRANSMISSION_KEYS;
use crate::safeguard::Safeguard;

/// Keyed scalar store with a safeguarded transmit projection
pub struct DataStore {
    data: Mutex<HashMap<String, f64>>,
    safeguard: Safeguard,
}

impl DataStore {
    /// Create an empty store guarded by the given safeguard engine
    pub fn new(safeguard: Safeguard) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            safeguard,
        }
    }

    /// Fetch values. An empty key list returns the full store; otherwise
    /// only the present, requested keys.
    pub fn get(&self, keys: &[&str]) -> HashMap<String, f64> {
        let data = self.data.lock().unwrap();
        if keys.is_empty() {
            data.clone()
        } else {
            keys.iter()
                .filter_map(|key| data.get(*key).map(|value| (key.to_string(), *value)))
                .collect()
        }
    }

    /// Fetch the safeguarded transmit projection: the requested keys (all
    /// of them when none are given) intersected with the transmit
    /// whitelist, with the current safeguard applied to the result.
    pub fn transmit(&self, keys: &[&str]) -> HashMap<String, f64> {
        let mut projection: HashMap<String, f64> = {
            let data = self.data.lock().unwrap();
            TRANSMISSION_KEYS
                .iter()
                .copied()
                .filter(|key| keys.is_empty() || keys.contains(key))
                .filter_map(|key| data.get(key).map(|value| (key.to_string(), *value)))
                .collect()
        };
        self.safeguard.apply(&mut projection);
        projection
    }

    /// Last-write-wins update of one key
    pub fn set(&self, key: &str, value: f64) {
        self.data.lock().unwrap().insert(key.to_string(), value);
    }

    /// Merge a batch of entries under one lock acquisition
    pub fn set_all(&self, entries: impl IntoIterator<Item = (String, f64)>) {
        let mut data = self.data.lock().unwrap();
        for (key, value) in entries {
            data.insert(key, value);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }
}
