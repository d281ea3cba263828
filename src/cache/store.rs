//! Entry-list cache with read-time freshness.
//!
//! Records are never dropped on expiry: an expired record is reported as
//! [`Lookup::Stale`] together with its value so callers can keep serving it
//! while a single background refresh replaces it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
const METRIC_LOOKUP_TOTAL: &str = "scriptorium_cache_lookup_total";
const METRIC_EVICT_TOTAL: &str = "scriptorium_cache_evict_total";

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// The record is younger than the requested refresh period.
    Fresh(V),
    /// The record has expired; the previous value is still returned.
    Stale(V),
    /// Nothing has ever been stored under the key (or it was invalidated).
    Miss,
}

impl<V> Lookup<V> {
    fn outcome(&self) -> &'static str {
        match self {
            Lookup::Fresh(_) => "fresh",
            Lookup::Stale(_) => "stale",
            Lookup::Miss => "miss",
        }
    }

    /// The cached value, fresh or not.
    pub fn into_value(self) -> Option<V> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale(value) => Some(value),
            Lookup::Miss => None,
        }
    }
}

/// Proof of refresh ownership handed out by [`CacheStore::claim_refresh`].
///
/// A ticket only commits while its marker is still the current one, so a
/// refresh that outlives an invalidation or a timeout is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    key: CacheKey,
    generation: u64,
}

impl RefreshTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Record<V> {
    value: V,
    written_at: Instant,
}

/// Process-wide store shared by every fetch coordinator.
///
/// Lock order is records first, then in-flight markers.
pub struct CacheStore<V> {
    records: Mutex<LruCache<CacheKey, Record<V>>>,
    in_flight: DashMap<CacheKey, u64>,
    generations: AtomicU64,
}

impl<V: Clone> CacheStore<V> {
    /// Create a new store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            records: Mutex::new(LruCache::new(config.capacity_non_zero())),
            in_flight: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Read a record, classifying it against `refresh_period`.
    pub fn get(&self, key: &CacheKey, refresh_period: Duration) -> Lookup<V> {
        let lookup = {
            let mut records = mutex_lock(&self.records, SOURCE, "get");
            match records.get(key) {
                Some(record) => {
                    let age = Instant::now().saturating_duration_since(record.written_at);
                    if age < refresh_period {
                        Lookup::Fresh(record.value.clone())
                    } else {
                        Lookup::Stale(record.value.clone())
                    }
                }
                None => Lookup::Miss,
            }
        };

        counter!(METRIC_LOOKUP_TOTAL, "outcome" => lookup.outcome()).increment(1);
        debug!(cache_key = %key, outcome = lookup.outcome(), "cache lookup");
        lookup
    }

    /// Create or replace the record and reset its freshness window. Clears any
    /// in-flight marker for the key.
    pub fn put(&self, key: CacheKey, value: V) {
        let mut records = mutex_lock(&self.records, SOURCE, "put");
        self.in_flight.remove(&key);
        Self::write(&mut records, key, value);
    }

    /// Mark a refresh as in flight. Returns `true` only for the first caller;
    /// the marker stays until the refresh commits, fails, or is cancelled.
    pub fn mark_refresh_in_flight(&self, key: &CacheKey) -> bool {
        self.claim_refresh(key).is_some()
    }

    /// Atomically claim refresh ownership of `key`.
    pub fn claim_refresh(&self, key: &CacheKey) -> Option<RefreshTicket> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let generation = self.generations.fetch_add(1, Ordering::SeqCst);
                vacant.insert(generation);
                Some(RefreshTicket {
                    key: key.clone(),
                    generation,
                })
            }
        }
    }

    /// Clear the in-flight marker without touching the stored value.
    pub fn cancel_in_flight(&self, key: &CacheKey) {
        self.in_flight.remove(key);
    }

    /// Commit a refreshed value if `ticket` still owns the key's marker.
    ///
    /// Returns `false` when the ticket was superseded (invalidated, timed out
    /// or cancelled); the value is dropped in that case.
    pub fn complete_refresh(&self, ticket: &RefreshTicket, value: V) -> bool {
        let mut records = mutex_lock(&self.records, SOURCE, "complete_refresh");
        if self.release(ticket) {
            Self::write(&mut records, ticket.key.clone(), value);
            true
        } else {
            false
        }
    }

    /// Give up a refresh, leaving the current value in place. Returns `false`
    /// when the ticket no longer owned the marker.
    pub fn abandon_refresh(&self, ticket: &RefreshTicket) -> bool {
        self.release(ticket)
    }

    /// Whether a refresh currently owns `key`.
    pub fn is_refresh_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Remove the record and any in-flight marker; the next read is a miss.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut records = mutex_lock(&self.records, SOURCE, "invalidate");
        self.in_flight.remove(key);
        records.pop(key).is_some()
    }

    /// Get the number of cached records.
    pub fn len(&self) -> usize {
        mutex_lock(&self.records, SOURCE, "len").len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, ticket: &RefreshTicket) -> bool {
        self.in_flight
            .remove_if(&ticket.key, |_, generation| *generation == ticket.generation)
            .is_some()
    }

    fn write(records: &mut LruCache<CacheKey, Record<V>>, key: CacheKey, value: V) {
        let record = Record {
            value,
            written_at: Instant::now(),
        };
        match records.push(key.clone(), record) {
            Some((evicted, _)) if evicted != key => {
                counter!(METRIC_EVICT_TOTAL).increment(1);
                debug!(cache_key = %evicted, "evicted least recently used entry list");
            }
            _ => {}
        }
    }
}
