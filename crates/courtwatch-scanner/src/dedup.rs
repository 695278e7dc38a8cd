//! Bounded history of already-sent notifications.
//!
//! A notification's rendered text is its identity. The cache keeps the most
//! recent `capacity` entries (oldest first) under a subject tag in the
//! variable store. Only confirmed deliveries are appended, so a failed send
//! is retried on the next cycle.

use std::collections::HashSet;
use std::sync::Arc;

use courtwatch_core::error::Result;
use courtwatch_core::store::VariableStore;
use serde_json::Value;

/// Recent notification history, most recent last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupCache {
    entries: Vec<String>,
    capacity: usize,
}

impl DedupCache {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from persisted entries, keeping the newest `capacity`.
    pub fn from_entries(entries: Vec<String>, capacity: usize) -> Self {
        let mut cache = Self {
            entries,
            capacity: capacity.max(1),
        };
        cache.truncate();
        cache
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, notification: &str) -> bool {
        self.entries.iter().any(|e| e == notification)
    }

    /// Candidates not yet in the cache, in their original order. Repeats
    /// within `candidates` are reported once.
    pub fn filter_new(&self, candidates: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|c| !self.contains(c) && seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    /// Append delivered notifications in emission order and evict the oldest
    /// beyond capacity.
    pub fn with_delivered(mut self, delivered: &[String]) -> Self {
        self.entries.extend(delivered.iter().cloned());
        self.truncate();
        self
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
    }
}

/// Loads and saves `DedupCache`s through the variable store.
pub struct DedupStore {
    store: Arc<dyn VariableStore>,
    capacity: usize,
}

impl DedupStore {
    pub fn new(store: Arc<dyn VariableStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    /// Load the cache for `subject`. A missing or unreadable value starts an
    /// empty history; a failing store is an error.
    pub fn load(&self, subject: &str) -> Result<DedupCache> {
        let entries = match self.store.get(subject)? {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<String>>(value).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Dedup cache '{subject}' is not a string list, starting fresh: {e}");
                Vec::new()
            }),
        };
        Ok(DedupCache::from_entries(entries, self.capacity))
    }

    pub fn save(&self, subject: &str, cache: &DedupCache) -> Result<()> {
        let description = format!(
            "{subject} notifications - last updated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.store
            .set_as(subject, &cache.entries, Some(&description))?;
        tracing::debug!("💾 Saved {} dedup entries for '{subject}'", cache.len());
        Ok(())
    }
}
