//! TTL + LRU byte-bounded resource body cache (spec.md §4.5, §5).
//!
//! Lookups never hold the shared read lock across an upgrade to
//! exclusive: [`ResourceCache::get`] takes a read lock to check
//! liveness, drops it, and only if the entry turned out to be expired
//! does it re-acquire the lock exclusively to evict it. This avoids the
//! deadlock that results from upgrading a lock already held for
//! "reentrancy" — documented as a two-phase access pattern in spec.md §5.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;

/// Cache-level failures. Currently only raised for misconfiguration.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("entry of {size} bytes exceeds cache capacity of {capacity} bytes")]
    EntryTooLarge { size: u64, capacity: u64 },
}

struct Entry {
    bytes: Vec<u8>,
    inserted_at: Instant,
    last_access: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }
}

/// Cumulative cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A byte-bounded, TTL-expiring, LRU-evicting cache of resource bodies.
pub struct ResourceCache {
    entries: RwLock<HashMap<String, Entry>>,
    max_size_bytes: u64,
    ttl: Duration,
    current_size_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResourceCache {
    #[must_use]
    pub fn new(max_size_bytes: u64, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size_bytes,
            ttl,
            current_size_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up `uri`, returning its cached bytes if present and not
    /// expired. Touches the entry's last-access time on a hit.
    pub async fn get(&self, uri: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(uri) {
                if !entry.is_expired(self.ttl, now) {
                    // Can't bump last_access under a shared lock; record
                    // the hit here and do the touch in a short separate
                    // write-lock section below.
                    drop(entries);
                    let mut entries = self.entries.write().await;
                    if let Some(entry) = entries.get_mut(uri) {
                        entry.last_access = now;
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Some(entry.bytes.clone());
                    }
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Entry existed but was expired: evict it under an exclusive lock.
        self.evict(uri).await;
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or replaces `uri`'s cached bytes, evicting least-recently
    /// accessed entries (ties broken by URI) until the cache fits within
    /// `max_size_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EntryTooLarge`] if `bytes` alone exceeds the
    /// cache's total capacity.
    pub async fn put(&self, uri: String, bytes: Vec<u8>) -> Result<(), CacheError> {
        let size = bytes.len() as u64;
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                capacity: self.max_size_bytes,
            });
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(old) = entries.remove(&uri) {
            self.current_size_bytes
                .fetch_sub(old.bytes.len() as u64, Ordering::Relaxed);
        }

        while self.current_size_bytes.load(Ordering::Relaxed) + size > self.max_size_bytes
            && !entries.is_empty()
        {
            let victim = entries
                .iter()
                .min_by(|a, b| {
                    a.1.last_access
                        .cmp(&b.1.last_access)
                        .then_with(|| a.0.cmp(b.0))
                })
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                if let Some(evicted) = entries.remove(&victim) {
                    self.current_size_bytes
                        .fetch_sub(evicted.bytes.len() as u64, Ordering::Relaxed);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            } else {
                break;
            }
        }

        self.current_size_bytes.fetch_add(size, Ordering::Relaxed);
        entries.insert(
            uri,
            Entry {
                bytes,
                inserted_at: now,
                last_access: now,
            },
        );
        Ok(())
    }

    async fn evict(&self, uri: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(uri) {
            self.current_size_bytes
                .fetch_sub(entry.bytes.len() as u64, Ordering::Relaxed);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn invalidate(&self, uri: &str) {
        self.evict(uri).await;
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Removes every entry whose TTL has elapsed. Intended to be driven
    /// by a background sweeper (spec.md §4.5: swept every five minutes
    /// by default).
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.is_expired(self.ttl, now))
            .map(|(k, _)| k.clone())
            .collect();
        for uri in &expired {
            self.evict(uri).await;
        }
        expired.len()
    }
}
