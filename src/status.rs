//! Read-only cache status snapshot for a status display

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::core::state::WorkerState;

/// Cached frames of one playlist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemCacheStatus {
    pub id: Uuid,
    pub name: String,
    pub frame_count: usize,
    /// Inclusive ranges, ascending
    pub cached_ranges: Vec<(usize, usize)>,
}

impl ItemCacheStatus {
    pub fn cached_frames(&self) -> usize {
        self.cached_ranges.iter().map(|(a, b)| b - a + 1).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub used_bytes: usize,
    pub max_bytes: usize,
    pub rate_bytes_per_ms: f64,
    pub smoothed_rate_bytes_per_ms: f64,
    pub state: WorkerState,
    pub cached_frames: usize,
    /// Jobs in the snapshot of the run in flight, including ones the worker
    /// already finished (0 when idle)
    pub queued_jobs: usize,
    pub items: Vec<ItemCacheStatus>,
}

/// Collapse sorted frame indices into inclusive ranges
pub fn cached_ranges(frames: &[usize]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &frame in frames {
        match ranges.last_mut() {
            Some((_, last)) if *last + 1 == frame => *last = frame,
            _ => ranges.push((frame, frame)),
        }
    }
    ranges
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cache {}M/{}M, {} frames, {:?}, {} jobs in run, {:.1} bytes/ms (avg {:.1})",
            self.used_bytes / 1024 / 1024,
            self.max_bytes / 1024 / 1024,
            self.cached_frames,
            self.state,
            self.queued_jobs,
            self.rate_bytes_per_ms,
            self.smoothed_rate_bytes_per_ms
        )?;
        for item in &self.items {
            let ranges: Vec<String> = item
                .cached_ranges
                .iter()
                .map(|(a, b)| if a == b { a.to_string() } else { format!("{}-{}", a, b) })
                .collect();
            writeln!(
                f,
                "  {:<24} {:>5}/{:<5} [{}]",
                item.name,
                item.cached_frames(),
                item.frame_count,
                ranges.join(", ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_ranges() {
        assert!(cached_ranges(&[]).is_empty());
        assert_eq!(cached_ranges(&[3]), vec![(3, 3)]);
        assert_eq!(cached_ranges(&[0, 1, 2, 5, 7, 8]), vec![(0, 2), (5, 5), (7, 8)]);
    }

    #[test]
    fn test_text_and_json() {
        let status = CacheStatus {
            used_bytes: 3 * 1024 * 1024,
            max_bytes: 8 * 1024 * 1024,
            rate_bytes_per_ms: 2.0,
            smoothed_rate_bytes_per_ms: 1.5,
            state: WorkerState::Running,
            cached_frames: 4,
            queued_jobs: 1,
            items: vec![ItemCacheStatus {
                id: Uuid::nil(),
                name: "clip".to_string(),
                frame_count: 10,
                cached_ranges: vec![(0, 2), (6, 6)],
            }],
        };
        let text = status.to_string();
        assert!(text.starts_with("cache 3M/8M, 4 frames, Running"));
        assert!(text.contains("[0-2, 6]"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "Running");
        assert_eq!(json["items"][0]["cached_ranges"][0][1], 2);
    }
}
