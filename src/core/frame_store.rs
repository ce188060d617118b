//! Frame store: decoded frames keyed by (item, frame index)
//!
//! Structure: HashMap<Uuid, HashMap<usize, CachedFrame>>
//! - Outer map: item id (source identifier) -> frames
//! - Inner map: frame index -> CachedFrame
//!
//! Benefits:
//! - cheap `invalidate_for()` - just remove the outer key
//! - O(1) lookup by (item, frame)
//! - IndexSet keeps insertion order for the fallback eviction
//!
//! All state sits behind one mutex, so an insert is atomic per key and a
//! reader never sees half an entry. Byte usage lives in the shared
//! [`CacheManager`] so the level can be read without taking the lock.

use indexmap::IndexSet;
use log::{debug, trace};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::core::cache_man::{CacheLevel, CacheManager};
use crate::entities::CachedFrame;

/// Identity of one cached frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    pub item: Uuid,
    pub frame: usize,
}

impl CacheKey {
    pub fn new(item: Uuid, frame: usize) -> Self {
        Self { item, frame }
    }
}

/// Hit/miss counters for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    frames: HashMap<Uuid, HashMap<usize, CachedFrame>>,
    /// Insertion order (front = oldest)
    order: IndexSet<CacheKey>,
}

impl StoreInner {
    fn remove(&mut self, key: CacheKey, manager: &CacheManager) -> Option<CachedFrame> {
        let frames = self.frames.get_mut(&key.item)?;
        let frame = frames.remove(&key.frame)?;
        if frames.is_empty() {
            self.frames.remove(&key.item);
        }
        self.order.shift_remove(&key);
        manager.free_memory(frame.bytes());
        Some(frame)
    }
}

/// Bounded frame store with byte-budget eviction
#[derive(Debug)]
pub struct FrameStore {
    inner: Mutex<StoreInner>,
    manager: Arc<CacheManager>,
    stats: CacheStats,
}

impl FrameStore {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        debug!("FrameStore created: limit={} bytes", manager.limit());
        Self {
            inner: Mutex::new(StoreInner::default()),
            manager,
            stats: CacheStats::default(),
        }
    }

    /// Get frame from the store. Never decodes.
    pub fn get(&self, key: CacheKey) -> Option<CachedFrame> {
        let result = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .frames
                .get(&key.item)
                .and_then(|frames| frames.get(&key.frame))
                .cloned()
        };

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    /// Check presence (no statistics)
    pub fn contains(&self, key: CacheKey) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .frames
            .get(&key.item)
            .is_some_and(|frames| frames.contains_key(&key.frame))
    }

    /// Insert or replace a frame.
    ///
    /// Does not evict: usage may go over budget until `evict_to_budget()` runs.
    pub fn insert(&self, key: CacheKey, frame: CachedFrame) {
        let size = frame.bytes();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        // Replacing frees the old entry first
        if let Some(old) = inner.remove(key, &self.manager) {
            trace!("Replaced frame {}:{} (freed {} bytes)", key.item, key.frame, old.bytes());
        }

        inner.frames.entry(key.item).or_default().insert(key.frame, frame);
        inner.order.insert(key);
        self.manager.add_memory(size);

        trace!("Cached frame {}:{} ({} bytes)", key.item, key.frame, size);
    }

    /// Evict until usage is within budget.
    ///
    /// Keys are popped from the front of `priority` (most removable first);
    /// keys that are no longer stored are skipped. If the list runs out while
    /// still over budget, the oldest inserted entries go next.
    ///
    /// Returns number of evicted frames. Usage is within budget afterwards.
    pub fn evict_to_budget(&self, priority: &mut VecDeque<CacheKey>) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut evicted = 0;
        let mut fallback = 0;

        while self.manager.check_memory_limit() {
            let Some(key) = priority.pop_front() else {
                break;
            };
            if inner.remove(key, &self.manager).is_some() {
                evicted += 1;
            }
        }

        while self.manager.check_memory_limit() {
            let Some(key) = inner.order.first().copied() else {
                break;
            };
            inner.remove(key, &self.manager);
            fallback += 1;
        }

        if evicted + fallback > 0 {
            debug!(
                "Evicted {} frames ({} by priority, {} oldest), level {}/{} bytes",
                evicted + fallback,
                evicted,
                fallback,
                self.manager.usage(),
                self.manager.limit()
            );
        }
        evicted + fallback
    }

    /// Remove every frame of one item. Returns number of removed frames.
    pub fn invalidate_for(&self, item: Uuid) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let Some(frames) = inner.frames.remove(&item) else {
            return 0;
        };

        let freed: usize = frames.values().map(|f| f.bytes()).sum();
        self.manager.free_memory(freed);
        inner.order.retain(|k| k.item != item);

        debug!("Invalidated item {}: {} frames, {} bytes freed", item, frames.len(), freed);
        frames.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let freed: usize = inner
            .frames
            .values()
            .flat_map(|frames| frames.values())
            .map(|f| f.bytes())
            .sum();
        self.manager.free_memory(freed);
        inner.frames.clear();
        inner.order.clear();
        debug!("Cleared frame store ({} bytes freed)", freed);
    }

    /// All keys, oldest insertion first
    pub fn keys(&self) -> Vec<CacheKey> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.iter().copied().collect()
    }

    /// Cached frame indices of one item, ascending
    pub fn item_frames(&self, item: Uuid) -> Vec<usize> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut frames: Vec<usize> = inner
            .frames
            .get(&item)
            .map(|f| f.keys().copied().collect())
            .unwrap_or_default();
        frames.sort_unstable();
        frames
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn level(&self) -> CacheLevel {
        self.manager.level()
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
