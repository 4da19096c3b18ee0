//! Time-bounded memoization of expensive simulation results.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::Result;

/// Auction simulation results stay valid for a week.
pub const AUCTION_CACHE_TTL_DAYS: i64 = 7;

#[derive(Clone, Debug)]
struct CacheEntry<T> {
    computed_at: DateTime<Utc>,
    value: T,
}

#[derive(Clone, Debug)]
pub struct SimulationCache<T> {
    ttl: Duration,
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T: Clone> SimulationCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn auction() -> Self {
        Self::new(Duration::days(AUCTION_CACHE_TTL_DAYS))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        now - entry.computed_at < self.ttl
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&T> {
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| &entry.value)
    }

    pub fn insert(&mut self, key: &str, now: DateTime<Utc>, value: T) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                computed_at: now,
                value,
            },
        );
    }

    /// Returns the fresh cached value or stores the result of `compute`.
    /// Failed computations are not cached.
    pub fn get_or_compute<F>(&mut self, key: &str, now: DateTime<Utc>, compute: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.get(key, now) {
            debug!(key, "Cache hit");
            return Ok(value.clone());
        }

        debug!(key, "Cache miss");
        let value = compute()?;
        self.insert(key, now, value.clone());
        Ok(value)
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.computed_at < ttl);
        before - self.entries.len()
    }
}
