//! Cache memory accounting and worker run epochs
//!
//! **Why**: The frame store, the worker and the status display all need the
//! same view of "bytes used vs. budget". Keeping both numbers in atomics lets
//! the foreground read the level at any time without touching the store lock.
//! The epoch counter tags every worker run so a completion can be matched to
//! the run it belongs to.
//!
//! **Used by**: FrameStore (usage), Scheduler (level snapshot, epochs)

use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use sysinfo::System;

/// Current vs. maximum byte usage
///
/// `current <= max` is the steady state; right after an insert it may be
/// above `max` until the next eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheLevel {
    pub current: usize,
    pub max: usize,
}

impl CacheLevel {
    pub fn is_over_budget(&self) -> bool {
        self.current > self.max
    }

    /// Bytes left before the budget is reached
    pub fn headroom(&self) -> usize {
        self.max.saturating_sub(self.current)
    }
}

/// Byte budget tracker shared by store and scheduler
#[derive(Debug)]
pub struct CacheManager {
    /// Bytes currently held by the frame store
    memory_usage: AtomicUsize,
    /// Budget in bytes - atomic so limits can change while the worker runs
    max_memory_bytes: AtomicUsize,
    /// Id of the most recently dispatched worker run
    current_epoch: AtomicU64,
}

impl CacheManager {
    /// Create manager with a fixed byte budget
    pub fn new(max_bytes: usize) -> Self {
        info!("CacheManager init: limit={} MB", max_bytes / 1024 / 1024);
        Self {
            memory_usage: AtomicUsize::new(0),
            max_memory_bytes: AtomicUsize::new(max_bytes),
            current_epoch: AtomicU64::new(0),
        }
    }

    /// Create manager with a budget derived from available system memory
    ///
    /// # Arguments
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0, e.g. 0.5 = 50%)
    /// * `reserve_gb` - Memory kept free for the system (GB)
    pub fn from_memory_fraction(mem_fraction: f64, reserve_gb: f64) -> Self {
        Self::new(Self::memory_budget(mem_fraction, reserve_gb))
    }

    /// Budget in bytes for a share of currently available memory
    pub fn memory_budget(mem_fraction: f64, reserve_gb: f64) -> usize {
        let mut sys = System::new();
        sys.refresh_memory();

        let available = sys.available_memory() as usize;
        let reserve = (reserve_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as usize;
        let usable = available.saturating_sub(reserve);
        let budget = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;

        debug!(
            "Memory budget: available={} MB, reserve={} MB, budget={} MB ({}%)",
            available / 1024 / 1024,
            reserve / 1024 / 1024,
            budget / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );
        budget
    }

    /// Snapshot of (current, max)
    pub fn level(&self) -> CacheLevel {
        CacheLevel {
            current: self.memory_usage.load(Ordering::Relaxed),
            max: self.max_memory_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.max_memory_bytes.load(Ordering::Relaxed)
    }

    /// Check if memory limit exceeded
    pub fn check_memory_limit(&self) -> bool {
        self.level().is_over_budget()
    }

    /// Memory usage as fraction of the limit (0.0 when the limit is 0)
    pub fn mem_usage_fraction(&self) -> f64 {
        let level = self.level();
        if level.max == 0 {
            0.0
        } else {
            level.current as f64 / level.max as f64
        }
    }

    pub fn add_memory(&self, bytes: usize) {
        self.memory_usage.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Free memory usage (saturating, never underflows)
    pub fn free_memory(&self, bytes: usize) {
        let _ = self
            .memory_usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn set_limit(&self, max_bytes: usize) {
        let old = self.max_memory_bytes.swap(max_bytes, Ordering::Relaxed);
        if old != max_bytes {
            info!("Memory limit updated: {} MB -> {} MB", old / 1024 / 1024, max_bytes / 1024 / 1024);
        }
    }

    /// Start a new run epoch and return it
    pub fn increment_epoch(&self) -> u64 {
        let epoch = self.current_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Epoch incremented: {}", epoch);
        epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }
}
