//! Resident image cache with pin-aware eviction.
//!
//! Entries are keyed by `(ImageReference, QualityTier)` and ordered by
//! recency through [`lru::LruCache`].  The cache is *unbounded* as far as the
//! `lru` crate is concerned; the capacity that matters here is the total
//! number of bytes, enforced by [`ImageCache::insert`] after every insert.
//!
//! Pinned entries (displayed by a viewport) are skipped by eviction.  If the
//! pinned set alone exceeds the capacity the cache stays over budget until
//! something is unpinned; it never drops an image that is on screen.
//!
//! This type is not synchronised.  The loader owns one instance behind its
//! own lock.

use std::time::Instant;

use lru::LruCache;
use medview_core::{CacheKey, ImageBuffer};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// How an eviction victim is chosen among unpinned entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used first.
    #[default]
    Lru,
    /// Largest `bytes × staleness` first, so one huge full-resolution frame
    /// goes before many small thumbnails of similar age.
    SizeWeighted,
}

#[derive(Debug)]
struct CacheEntry {
    buffer: ImageBuffer,
    bytes: usize,
    pins: u32,
    last_access: Instant,
    /// Inserted by prefetch and not yet handed to a foreground request.
    prefetched: bool,
}

#[derive(Debug)]
pub struct ImageCache {
    entries: LruCache<CacheKey, CacheEntry>,
    capacity_bytes: usize,
    resident_bytes: usize,
    policy: EvictionPolicy,
    evictions: u64,
}

impl ImageCache {
    pub fn new(capacity_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity_bytes,
            resident_bytes: 0,
            policy,
            evictions: 0,
        }
    }

    /// Returns the buffer and marks the entry most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<ImageBuffer> {
        let entry = self.entries.get_mut(key)?;
        entry.last_access = Instant::now();
        Some(entry.buffer.clone())
    }

    /// Returns the buffer without touching recency.
    pub fn peek(&self, key: &CacheKey) -> Option<&ImageBuffer> {
        self.entries.peek(key).map(|e| &e.buffer)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Inserts (or replaces) an entry, then evicts down to capacity.
    ///
    /// Returns the keys that were evicted.  A replaced entry keeps its pins.
    pub fn insert(&mut self, buffer: ImageBuffer, prefetched: bool) -> Vec<CacheKey> {
        self.insert_with_pins(buffer, prefetched, 0)
    }

    /// Inserts an entry that is pinned before eviction runs, so it cannot be
    /// its own victim.
    pub fn insert_pinned(&mut self, buffer: ImageBuffer) -> Vec<CacheKey> {
        self.insert_with_pins(buffer, false, 1)
    }

    fn insert_with_pins(&mut self, buffer: ImageBuffer, prefetched: bool, extra_pins: u32) -> Vec<CacheKey> {
        let key = buffer.key();
        let bytes = buffer.byte_size();
        let pins = match self.entries.pop(&key) {
            Some(old) => {
                self.resident_bytes -= old.bytes;
                old.pins
            }
            None => 0,
        };
        self.entries.put(
            key.clone(),
            CacheEntry {
                buffer,
                bytes,
                pins: pins + extra_pins,
                last_access: Instant::now(),
                prefetched,
            },
        );
        self.resident_bytes += bytes;
        trace!(%key, bytes, resident = self.resident_bytes, "cache insert");
        self.evict()
    }

    /// Increments the pin count.  Returns `false` if the key is not resident.
    pub fn pin(&mut self, key: &CacheKey) -> bool {
        match self.entries.peek_mut(key) {
            Some(entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    /// Decrements the pin count, then evicts if the cache is over budget.
    ///
    /// Returns `false` if the key is not resident or was not pinned.
    pub fn unpin(&mut self, key: &CacheKey) -> bool {
        let released = match self.entries.peek_mut(key) {
            Some(entry) if entry.pins > 0 => {
                entry.pins -= 1;
                true
            }
            _ => false,
        };
        if released {
            self.evict();
        }
        released
    }

    pub fn pin_count(&self, key: &CacheKey) -> u32 {
        self.entries.peek(key).map_or(0, |e| e.pins)
    }

    /// Clears and returns the "inserted by prefetch" flag of an entry.
    pub fn take_prefetched(&mut self, key: &CacheKey) -> bool {
        match self.entries.peek_mut(key) {
            Some(entry) => std::mem::take(&mut entry.prefetched),
            None => false,
        }
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Drops every entry, pinned or not.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.resident_bytes = 0;
    }

    fn evict(&mut self) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while self.resident_bytes > self.capacity_bytes {
            let Some(victim) = self.pick_victim() else {
                warn!(
                    resident = self.resident_bytes,
                    capacity = self.capacity_bytes,
                    "cache over capacity but every entry is pinned"
                );
                break;
            };
            if let Some(entry) = self.entries.pop(&victim) {
                self.resident_bytes -= entry.bytes;
                self.evictions += 1;
                debug!(
                    key = %victim,
                    bytes = entry.bytes,
                    idle_ms = entry.last_access.elapsed().as_millis() as u64,
                    "evicted cache entry"
                );
                evicted.push(victim);
            }
        }
        evicted
    }

    fn pick_victim(&self) -> Option<CacheKey> {
        // `iter()` walks most-recent first; reverse it to start at the LRU end.
        let unpinned = self.entries.iter().rev().filter(|(_, e)| e.pins == 0);
        match self.policy {
            EvictionPolicy::Lru => unpinned.map(|(k, _)| k.clone()).next(),
            EvictionPolicy::SizeWeighted => {
                let len = self.entries.len() as u128;
                unpinned
                    .enumerate()
                    .max_by_key(|(staleness_rank, (_, e))| {
                        // rank 0 is the least recently used entry
                        (e.bytes as u128) * (len - *staleness_rank as u128)
                    })
                    .map(|(_, (k, _))| k.clone())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
