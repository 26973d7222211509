//! In-process TTL cache for computed context sections
//!
//! Entries are keyed by (session, identifier) and expire purely by wall-clock
//! age. The cache is an explicit instance passed to whoever needs it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds (default: 60)
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted: Instant,
}

#[derive(Debug)]
pub struct ContextCache<V> {
    entries: DashMap<(String, String), Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> ContextCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs))
    }

    fn key(session: &str, identifier: &str) -> (String, String) {
        (session.to_string(), identifier.to_string())
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        entry.inserted.elapsed() < self.ttl
    }

    /// Fresh value for the key; an expired entry is dropped
    pub fn get(&self, session: &str, identifier: &str) -> Option<V> {
        let key = Self::key(session, identifier);
        let hit = self
            .entries
            .get(&key)
            .map(|e| (self.is_fresh(&e), e.value.clone()));

        match hit {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, session: &str, identifier: &str, value: V) {
        self.entries.insert(
            Self::key(session, identifier),
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Cached value, or build one. Only `Some` results are stored.
    pub fn get_or_build<F>(&self, session: &str, identifier: &str, build: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if let Some(value) = self.get(session, identifier) {
            debug!("Context cache hit {}:{}", session, identifier);
            return Some(value);
        }

        let value = build()?;
        self.insert(session, identifier, value.clone());
        Some(value)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
