//! Shared TTL cache with single-flight computation
//!
//! Every expensive lookup in the engine (policy evaluation, model inference,
//! regulation fetches) goes through [`Cache::get_or_compute`]:
//! - at most one computation per key runs at a time; concurrent callers for
//!   the same key wait for it and share its result
//! - entries expire after their TTL and are recomputed lazily on next access
//! - failed computations are never stored
//! - a disabled cache computes on every call

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 10_000;

struct Entry<V> {
    value: V,
    computed_at: Instant,
    expires_at: Instant,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<Entry<V>>>>;

/// Single-flight TTL cache
pub struct Cache<V> {
    name: String,
    enabled: bool,
    capacity: usize,
    slots: Mutex<HashMap<String, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl<V: Clone> Cache<V> {
    /// Create an enabled cache
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_enabled(name, true)
    }

    /// Create a cache that can be switched off by configuration
    pub fn with_enabled(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            capacity: DEFAULT_CAPACITY,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bound the number of keys. A new key beyond the bound first sweeps
    /// expired slots, then evicts the oldest idle entry. Slots with a
    /// computation in flight are never evicted, so the bound can be exceeded
    /// while that many keys are computing at once.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached value for `key`, or run `compute` exactly once for
    /// all concurrent callers and cache its result for `ttl`.
    ///
    /// Callers that joined an in-flight computation receive its result even
    /// when `ttl` is zero. If the computing caller is cancelled or fails, the
    /// next waiter computes instead.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !self.enabled {
            self.record_miss();
            return compute().await;
        }

        let arrived = Instant::now();
        let slot = self.slot(key);

        // The per-key async lock is the single-flight gate; the map lock is
        // never held across an await.
        let mut guard = slot.lock().await;
        if let Some(entry) = guard.as_ref() {
            let now = Instant::now();
            if entry.expires_at > now || entry.computed_at > arrived {
                self.record_hit();
                trace!(cache = %self.name, key, "cache hit");
                return Ok(entry.value.clone());
            }
        }

        self.record_miss();
        trace!(cache = %self.name, key, "cache miss, computing");
        let value = compute().await?;
        let now = Instant::now();
        *guard = Some(Entry {
            value: value.clone(),
            computed_at: now,
            expires_at: now + ttl,
        });
        Ok(value)
    }

    /// Non-blocking lookup of a live entry.
    ///
    /// Returns `None` while a computation for the key is in flight.
    pub fn peek(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let slot = self.slots.lock().get(key).cloned()?;
        let guard = slot.try_lock().ok()?;
        let entry = guard.as_ref()?;
        if entry.expires_at > Instant::now() {
            self.record_hit();
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store a value computed outside `get_or_compute` (batch paths)
    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let slot = self.slot(key);
        // An in-flight computation will overwrite this shortly anyway
        let locked = slot.try_lock();
        if let Ok(mut guard) = locked {
            let now = Instant::now();
            *guard = Some(Entry {
                value,
                computed_at: now,
                expires_at: now + ttl,
            });
        }
    }

    /// Number of keys currently tracked (live or expired)
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &str) -> Slot<V> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        if slots.len() >= self.capacity {
            sweep_expired(&mut slots);
        }
        if slots.len() >= self.capacity {
            evict_oldest(&mut slots);
        }
        let slot: Slot<V> = Arc::new(tokio::sync::Mutex::new(None));
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("adcomply_cache_hits_total", "cache" => self.name.clone()).increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("adcomply_cache_misses_total", "cache" => self.name.clone()).increment(1);
    }
}

/// Remove expired, idle slots. Slots that are locked (in flight) or still
/// referenced by a waiter are kept.
fn sweep_expired<V>(slots: &mut HashMap<String, Slot<V>>) {
    let now = Instant::now();
    slots.retain(|_, slot| {
        if Arc::strong_count(slot) > 1 {
            return true;
        }
        match slot.try_lock() {
            Ok(guard) => guard.as_ref().map_or(false, |entry| entry.expires_at > now),
            Err(_) => true,
        }
    });
}

/// Remove the idle slot whose value was computed longest ago; empty idle
/// slots go first.
fn evict_oldest<V>(slots: &mut HashMap<String, Slot<V>>) {
    let oldest = slots
        .iter()
        .filter(|(_, slot)| Arc::strong_count(slot) == 1)
        .filter_map(|(key, slot)| {
            let guard = slot.try_lock().ok()?;
            let computed_at = guard.as_ref().map(|entry| entry.computed_at);
            Some((computed_at, key.clone()))
        })
        .min();
    if let Some((_, key)) = oldest {
        slots.remove(&key);
    }
}
