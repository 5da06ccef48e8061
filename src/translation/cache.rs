//! Translation cache with TTL expiry and capacity eviction

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    translation: String,
    cached_at: Instant,
}

/// Cache occupancy snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// Source text -> translation, bounded in age and size.
///
/// Expired entries read as absent and are purged on lookup and insert. When
/// an insert pushes the cache over `max_size`, the oldest entries go first.
#[derive(Debug)]
pub struct TranslationCache {
    entries: HashMap<String, CacheEntry>,
    max_size: usize,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Live translation for `text`, if any
    pub fn get(&mut self, text: &str) -> Option<String> {
        self.get_at(text, Instant::now())
    }

    /// Store a translation, evicting expired then oldest entries
    pub fn insert(&mut self, text: impl Into<String>, translation: impl Into<String>) {
        self.insert_at(text.into(), translation.into(), Instant::now());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Instant::now())
    }

    pub(crate) fn get_at(&mut self, text: &str, now: Instant) -> Option<String> {
        let entry = self.entries.get(text)?;
        if self.is_live(entry, now) {
            return Some(entry.translation.clone());
        }
        self.entries.remove(text);
        None
    }

    pub(crate) fn insert_at(&mut self, text: String, translation: String, now: Instant) {
        self.purge_expired(now);
        self.entries.insert(
            text,
            CacheEntry {
                translation,
                cached_at: now,
            },
        );
        self.evict_oldest();
    }

    pub(crate) fn stats_at(&self, now: Instant) -> CacheStats {
        let valid_entries = self
            .entries
            .values()
            .filter(|entry| self.is_live(entry, now))
            .count();
        CacheStats {
            total_entries: self.entries.len(),
            valid_entries,
            expired_entries: self.entries.len() - valid_entries,
        }
    }

    fn is_live(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.cached_at) < self.ttl
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.cached_at) < ttl);
    }

    fn evict_oldest(&mut self) {
        let excess = self.entries.len().saturating_sub(self.max_size);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|(text, entry)| (entry.cached_at, text.clone()))
            .collect();
        by_age.sort();
        for (_, text) in by_age.into_iter().take(excess) {
            self.entries.remove(&text);
        }
    }
}
