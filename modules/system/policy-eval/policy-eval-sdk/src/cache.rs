//! Caches shared by evaluations across requests.
//!
//! Both caches are owned by the authorizer and handed to the evaluator
//! through [`crate::EvalContext`]; only the evaluator reads or writes them.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

fn default_max_entries() -> usize {
    10_000
}

/// Cache sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct InterQueryCacheConfig {
    /// Upper bound on the number of entries in each cache.
    pub max_entries: usize,
}

impl Default for InterQueryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// A cache slot. Empty while its first build is in flight; a failed build
/// drops it from the map.
#[derive(Debug, Default)]
struct Slot {
    cell: OnceCell<Entry>,
}

impl Slot {
    fn filled(entry: Entry) -> Self {
        Self {
            cell: OnceCell::new_with(Some(entry)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.cell.get().is_some_and(|e| e.expires_at <= now)
    }

    fn live_value(&self, now: Instant) -> Option<Value> {
        self.cell
            .get()
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }
}

/// Cross-request cache with caller-chosen TTLs.
///
/// Concurrent misses on one key are coalesced: a single caller builds the
/// value while the others wait for it, and subsequent callers are served the
/// completed entry until it expires.
#[derive(Debug)]
pub struct InterQueryCache {
    entries: DashMap<String, Arc<Slot>>,
    max_entries: usize,
}

impl Default for InterQueryCache {
    fn default() -> Self {
        Self::new(&InterQueryCacheConfig::default())
    }
}

impl InterQueryCache {
    #[must_use]
    pub fn new(config: &InterQueryCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: config.max_entries.max(1),
        }
    }

    /// Live value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let slot = self.entries.get(key).map(|s| Arc::clone(s.value()))?;
        let value = slot.live_value(now);
        if value.is_none() && slot.is_expired(now) {
            self.remove_expired(key, &slot);
        }
        value
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub fn insert(&self, key: &str, value: Value, ttl: Duration) {
        let now = Instant::now();
        if !self.entries.contains_key(key) {
            self.make_room(now);
        }
        let slot = Slot::filled(Entry {
            value,
            expires_at: now + ttl,
        });
        self.entries.insert(key.to_owned(), Arc::new(slot));
    }

    /// Return the live value for `key`, building it with `build` on a miss.
    ///
    /// `build` returns the value and how long it stays valid. Only one build
    /// runs per key at a time; a failed build leaves the key empty so the
    /// next caller retries.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `build`.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, build: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Value, Duration), E>>,
    {
        let slot = self.slot_for(key);
        let built = slot
            .cell
            .get_or_try_init(|| async {
                let (value, ttl) = build().await?;
                Ok::<_, E>(Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                })
            })
            .await;
        match built {
            Ok(entry) => Ok(entry.value.clone()),
            Err(e) => {
                self.entries.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot) && current.cell.get().is_none()
                });
                Err(e)
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .and_then(|(_, slot)| slot.live_value(now))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of slots, including in-flight and expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot_for(&self, key: &str) -> Arc<Slot> {
        let now = Instant::now();
        let existing = self.entries.get(key).map(|s| Arc::clone(s.value()));
        match existing {
            Some(slot) if !slot.is_expired(now) => return slot,
            Some(slot) => self.remove_expired(key, &slot),
            None => {}
        }
        if !self.entries.contains_key(key) {
            self.make_room(now);
        }
        let slot = self.entries.entry(key.to_owned()).or_default();
        Arc::clone(slot.value())
    }

    /// Remove `key` only if it still maps to `slot`, so a fresh entry stored by
    /// a concurrent caller survives.
    fn remove_expired(&self, key: &str, slot: &Arc<Slot>) {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    fn make_room(&self, now: Instant) {
        if self.entries.len() < self.max_entries {
            return;
        }
        // Empty slots nobody else holds are leftovers of failed builds.
        self.entries.retain(|_, slot| {
            !slot.is_expired(now) && !(slot.cell.get().is_none() && Arc::strong_count(slot) == 1)
        });
        if self.entries.len() < self.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .filter_map(|e| e.value().cell.get().map(|v| (e.key().clone(), v.expires_at)))
            .min_by_key(|(_, expires_at)| *expires_at)
            .map(|(key, _)| key);
        if let Some(key) = victim {
            tracing::debug!(key = %key, "Inter-query cache full, evicting entry closest to expiry");
            self.entries.remove(&key);
        }
    }
}

/// Cross-request cache for parsed values (no expiry).
///
/// When full, inserting a new key evicts an arbitrary existing one.
#[derive(Debug)]
pub struct InterQueryValueCache {
    entries: DashMap<String, Value>,
    max_entries: usize,
}

impl Default for InterQueryValueCache {
    fn default() -> Self {
        Self::new(&InterQueryCacheConfig::default())
    }
}

impl InterQueryValueCache {
    #[must_use]
    pub fn new(config: &InterQueryCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: config.max_entries.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn insert(&self, key: &str, value: Value) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key.to_owned(), value);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
