/// Time-bounded memoization of search results.
///
/// Keyed by `(query, limit)`. Entries are checked for age on every read and
/// dropped lazily; there is no sweeper and no size bound.
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::models::SearchResult;

/// Default lifetime of a cached result list.
pub const CACHE_DURATION: Duration = Duration::from_secs(300);

struct CacheEntry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

pub struct ResultCache {
    entries: Mutex<HashMap<(String, u32), CacheEntry>>,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CACHE_DURATION)
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Results stored for `(query, limit)` if they are younger than the TTL.
    /// A stale entry is removed as a side effect.
    pub fn lookup(&self, query: &str, limit: u32) -> Option<Vec<SearchResult>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (query.to_string(), limit);

        let entry = entries.get(&key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            return Some(entry.results.clone());
        }

        tracing::debug!("Cache entry for {query:?} (limit {limit}) expired");
        entries.remove(&key);
        None
    }

    /// Insert or overwrite the entry for `(query, limit)`, stamped now.
    pub fn store(&self, query: &str, limit: u32, results: Vec<SearchResult>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            (query.to_string(), limit),
            CacheEntry {
                results,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
