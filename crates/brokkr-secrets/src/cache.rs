//! Process-lifetime memo of fetched items
//!
//! One entry per key, loaded at most once even when many tasks ask for the
//! same key at the same time. Negative results ("not found") are ordinary
//! values and are cached like any other; loader errors are not, so the next
//! caller retries. Entries live until the process exits unless a TTL is
//! configured or the entry is invalidated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    loaded_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct SecretCache<V> {
    slots: Mutex<HashMap<String, Arc<OnceCell<Entry<V>>>>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> SecretCache<V> {
    /// `ttl` of `None` keeps entries for the life of the cache
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, running `loader` if there is none.
    ///
    /// Concurrent callers for the same key wait on a single load. If the
    /// loader fails (or its future is dropped) the slot stays empty.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.slot(key);
        let mut loaded_here = false;

        let entry = cell
            .get_or_try_init(|| {
                loaded_here = true;
                async move {
                    let value = loader().await?;
                    Ok::<_, E>(Entry {
                        value,
                        loaded_at: Instant::now(),
                    })
                }
            })
            .await?;

        if loaded_here {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Cache hit");
        }

        Ok(entry.value.clone())
    }

    /// Cached value without loading
    pub fn peek(&self, key: &str) -> Option<V> {
        let slots = self.lock();
        slots
            .get(key)
            .and_then(|cell| cell.get())
            .filter(|entry| !self.is_expired(entry))
            .map(|entry| entry.value.clone())
    }

    /// Drop one entry; the next lookup reloads it
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop entries whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|key, _| !key.starts_with(prefix));
        before - slots.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Slot for `key`, replacing an expired one
    fn slot(&self, key: &str) -> Arc<OnceCell<Entry<V>>> {
        let mut slots = self.lock();

        if let Some(cell) = slots.get(key) {
            match cell.get() {
                Some(entry) if self.is_expired(entry) => {
                    trace!(key, "Cache entry expired");
                }
                _ => return Arc::clone(cell),
            }
        }

        let cell = Arc::new(OnceCell::new());
        slots.insert(key.to_string(), Arc::clone(&cell));
        cell
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl.is_some_and(|ttl| entry.loaded_at.elapsed() >= ttl)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<Entry<V>>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for SecretCache<V> {
    fn default() -> Self {
        Self::new(None)
    }
}
