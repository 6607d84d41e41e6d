use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::database::QueryResult;

/// Tuning knobs for [`QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of cached queries before the least recently used entry
    /// is evicted.
    pub max_items: usize,
    /// Absolute age since insertion after which an entry is dead.
    pub max_age: Duration,
    /// Results whose serialized size exceeds this are never inserted.
    pub max_entry_bytes: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_age: Duration::from_secs(5 * 60),
            max_entry_bytes: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

struct CacheEntry {
    result: QueryResult,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
    hit_count: u64,
    miss_count: u64,
}

/// Bounded, TTL-based memoization of read-only query results, keyed by
/// connection id and normalized query text.
///
/// Constructed once at process start and injected into whatever drives the
/// backend; lookups are synchronous. Callers must [`invalidate`] a connection
/// after any mutating statement.
///
/// [`invalidate`]: QueryCache::invalidate
pub struct QueryCache {
    options: CacheOptions,
    state: Mutex<CacheState>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl QueryCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn cache_key(connection_id: &str, query: &str) -> String {
        format!("{}:{}", connection_id, normalize_query(query))
    }

    pub fn get(&self, connection_id: &str, query: &str) -> Option<QueryResult> {
        let key = Self::cache_key(connection_id, query);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let expired = state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.inserted_at.elapsed() > self.options.max_age);
        if expired {
            state.entries.remove(&key);
        }

        state.clock += 1;
        let clock = state.clock;
        match state.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = clock;
                let result = entry.result.clone();
                state.hit_count += 1;
                Some(result)
            }
            None => {
                state.miss_count += 1;
                None
            }
        }
    }

    /// Insert a result. Oversized payloads are silently skipped.
    pub fn set(&self, connection_id: &str, query: &str, result: QueryResult) {
        let size = serde_json::to_string(&result).map(|s| s.len()).unwrap_or(0);
        if size > self.options.max_entry_bytes {
            tracing::debug!(size, "skipping cache insert, result too large");
            return;
        }

        let key = Self::cache_key(connection_id, query);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clock += 1;
        let clock = state.clock;
        state.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );

        while state.entries.len() > self.options.max_items {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    state.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop every entry for one connection, e.g. after a schema change.
    pub fn invalidate(&self, connection_id: &str) {
        let prefix = format!("{connection_id}:");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - state.entries.len();
        tracing::debug!(connection_id, removed, "invalidated cached queries");
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = CacheState::default();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let total = state.hit_count + state.miss_count;
        CacheStats {
            size: state.entries.len(),
            hit_count: state.hit_count,
            miss_count: state.miss_count,
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hit_count as f64 / total as f64 * 100.0
            },
        }
    }
}

/// Trim, collapse whitespace runs and lowercase, so trivially reformatted
/// queries share a cache entry.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
