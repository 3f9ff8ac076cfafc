//! Bounded memo of resolved date strings.
//!
//! Keys combine the date text with the custom-format signature, so a config
//! change never serves stale entries. Eviction is oldest-first.

use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct DateParseCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Option<i64>>>,
}

impl DateParseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn key(text: &str, formats: &[String]) -> String {
        format!("{}|{}", text, formats.join(","))
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Option<i64>>> {
        // A poisoned map still holds valid entries.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, text: &str, formats: &[String]) -> Option<Option<i64>> {
        self.lock().get(&Self::key(text, formats)).copied()
    }

    /// Return the cached resolution, or run `resolve` once and remember its outcome
    /// (including a miss).
    pub fn get_or_resolve<F>(&self, text: &str, formats: &[String], resolve: F) -> Option<i64>
    where
        F: FnOnce() -> Option<i64>,
    {
        let key = Self::key(text, formats);
        if let Some(hit) = self.lock().get(&key) {
            log::debug!("date cache hit for {:?}", text);
            return *hit;
        }
        let value = resolve();
        let mut entries = self.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.shift_remove_index(0);
        }
        entries.insert(key, value);
        value
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for DateParseCache {
    fn default() -> Self {
        Self::new(1_000)
    }
}
