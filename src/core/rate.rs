//! Caching rate gauges
//!
//! The worker measures how many bytes it produced per wall-clock interval and
//! sends a [`RateSample`]; the scheduler forwards samples here. Gauges are
//! atomics, so a status display can read them from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Weight of the newest sample in the smoothed rate
const SMOOTHING: f64 = 0.3;

/// Bytes produced by the worker over `elapsed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl RateSample {
    /// Rate of this sample in bytes per millisecond
    pub fn bytes_per_ms(&self) -> f64 {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        if ms <= 0.0 { 0.0 } else { self.bytes as f64 / ms }
    }
}

/// Latest, smoothed and cumulative caching rate
#[derive(Debug, Default)]
pub struct RateReporter {
    latest: AtomicU64,   // f64 bits, bytes/ms
    smoothed: AtomicU64, // f64 bits, bytes/ms
    total_bytes: AtomicU64,
    total_micros: AtomicU64,
    samples: AtomicU64,
}

impl RateReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample
    pub fn record(&self, sample: RateSample) {
        let rate = sample.bytes_per_ms();
        let count = self.samples.fetch_add(1, Ordering::Relaxed);

        let smoothed = if count == 0 {
            rate
        } else {
            let prev = f64::from_bits(self.smoothed.load(Ordering::Relaxed));
            prev + SMOOTHING * (rate - prev)
        };

        self.latest.store(rate.to_bits(), Ordering::Relaxed);
        self.smoothed.store(smoothed.to_bits(), Ordering::Relaxed);
        self.total_bytes.fetch_add(sample.bytes, Ordering::Relaxed);
        self.total_micros
            .fetch_add(sample.elapsed.as_micros() as u64, Ordering::Relaxed);

        log::trace!(
            "Caching rate: {:.1} bytes/ms (smoothed {:.1})",
            rate,
            smoothed
        );
    }

    /// Rate of the most recent sample (bytes/ms)
    pub fn rate_bytes_per_ms(&self) -> f64 {
        f64::from_bits(self.latest.load(Ordering::Relaxed))
    }

    /// Exponentially smoothed rate (bytes/ms)
    pub fn smoothed_bytes_per_ms(&self) -> f64 {
        f64::from_bits(self.smoothed.load(Ordering::Relaxed))
    }

    /// Total bytes over total time since the last reset (bytes/ms)
    pub fn cumulative_bytes_per_ms(&self) -> f64 {
        let micros = self.total_micros.load(Ordering::Relaxed);
        if micros == 0 {
            0.0
        } else {
            self.total_bytes.load(Ordering::Relaxed) as f64 * 1000.0 / micros as f64
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.latest.store(0f64.to_bits(), Ordering::Relaxed);
        self.smoothed.store(0f64.to_bits(), Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        self.total_micros.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}
