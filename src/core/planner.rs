//! Cache planning: window, job queue and dequeue list
//!
//! Pure functions over a snapshot of the playlist, the playback position and
//! the keys currently in the store. The scheduler calls [`plan`] whenever it
//! needs a fresh queue.
//!
//! # Window
//!
//! The playlist is flattened into one global timeline. With the playhead at
//! global position `p` the window is `[p - lookbehind, p + lookahead]`, so the
//! lookahead continues into the next items. Frames are ranked `p, p+1, p-1,
//! p+2, p-2, ...`. Selected items that are not playing follow, each with its
//! first `lookahead + 1` frames.
//!
//! # Budget
//!
//! Ranked frames are admitted while their summed `frame_bytes()` fits into the
//! budget. Only admitted frames are queued, so a finished run never has to
//! evict frames it just produced.
//!
//! # Dequeue order
//!
//! Cached frames that are not admitted, farthest from the playhead first.
//! Frames of items that are no longer in the playlist come before everything
//! else. Equal distances keep store insertion order (oldest first).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::frame_store::CacheKey;
use crate::core::worker::CacheJob;
use crate::entities::{MediaItem, PlaybackPosition};

/// Planning inputs (snapshot)
pub struct PlanInput<'a> {
    /// Playlist items in playback order, items being deleted already removed
    pub items: &'a [Arc<dyn MediaItem>],
    /// Pinned items in selection order
    pub selected: &'a [Uuid],
    pub position: PlaybackPosition,
    pub lookahead: usize,
    pub lookbehind: usize,
    /// Byte budget for the planned frames
    pub budget: usize,
    /// Store keys, oldest insertion first
    pub cached: &'a [CacheKey],
    /// Frames that failed to decode
    pub failed_frames: &'a HashSet<CacheKey>,
    /// Items whose source failed
    pub failed_items: &'a HashSet<Uuid>,
}

/// Result of one planning pass
#[derive(Debug, Default)]
pub struct Plan {
    /// Closest first
    pub jobs: Vec<CacheJob>,
    /// Most removable first
    pub dequeue: Vec<CacheKey>,
    /// Global playhead position, if an item is playing
    pub playhead: Option<usize>,
    /// Frames in window + pinned items
    pub wanted: usize,
    /// Frames admitted under the budget
    pub admitted: usize,
}

impl Plan {
    /// Same jobs (items and ranges) in the same order
    pub fn same_jobs(&self, other: &[CacheJob]) -> bool {
        self.jobs.len() == other.len() && self.jobs.iter().zip(other).all(|(a, b)| a.same_work(b))
    }
}

/// Playlist flattened to one frame axis
pub struct Timeline<'a> {
    items: &'a [Arc<dyn MediaItem>],
    /// Global start of each item
    offsets: Vec<usize>,
    index: HashMap<Uuid, usize>,
    total: usize,
}

impl<'a> Timeline<'a> {
    pub fn new(items: &'a [Arc<dyn MediaItem>]) -> Self {
        let mut offsets = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        let mut total = 0;
        for (i, item) in items.iter().enumerate() {
            offsets.push(total);
            index.insert(item.id(), i);
            total += item.frame_count();
        }
        Self { items, offsets, index, total }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Global position of a frame (frame clamped to the item)
    pub fn global(&self, item: Uuid, frame: usize) -> Option<usize> {
        let idx = *self.index.get(&item)?;
        let count = self.items[idx].frame_count();
        if count == 0 {
            return None;
        }
        Some(self.offsets[idx] + frame.min(count - 1))
    }

    /// Item index and local frame of a global position
    pub fn locate(&self, global: usize) -> Option<(usize, usize)> {
        if global >= self.total {
            return None;
        }
        // Last item starting at or before `global` that is not empty
        let idx = self.offsets.partition_point(|&start| start <= global) - 1;
        let idx = (0..=idx).rev().find(|&i| self.items[i].frame_count() > 0)?;
        Some((idx, global - self.offsets[idx]))
    }
}

/// Where a wanted frame comes from; jobs never mix groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
    Forward,
    Backward,
    Pinned(usize),
}

#[derive(Debug, Clone, Copy)]
struct Wanted {
    group: Group,
    item: usize,
    frame: usize,
    rank: usize,
}

/// Compute the job queue and dequeue list
pub fn plan(input: &PlanInput<'_>) -> Plan {
    let timeline = Timeline::new(input.items);
    let playhead = input
        .position
        .item
        .and_then(|id| timeline.global(id, input.position.frame));

    let wanted = ranked_frames(input, &timeline, playhead);
    let cached: HashSet<CacheKey> = input.cached.iter().copied().collect();

    // Budget fit, in rank order
    let mut admitted_keys = HashSet::with_capacity(wanted.len());
    let mut pending = Vec::new();
    let mut bytes = 0usize;
    for w in &wanted {
        let item = &input.items[w.item];
        let key = CacheKey::new(item.id(), w.frame);
        if input.failed_items.contains(&key.item) || input.failed_frames.contains(&key) {
            continue;
        }
        bytes = bytes.saturating_add(item.frame_bytes());
        if bytes > input.budget {
            break;
        }
        admitted_keys.insert(key);
        if !cached.contains(&key) {
            pending.push(*w);
        }
    }

    let jobs = build_jobs(input.items, pending);
    let dequeue = build_dequeue(input.cached, &admitted_keys, &timeline, playhead);

    Plan {
        jobs,
        dequeue,
        playhead,
        wanted: wanted.len(),
        admitted: admitted_keys.len(),
    }
}

/// Window frames by proximity, then pinned items
fn ranked_frames(input: &PlanInput<'_>, timeline: &Timeline<'_>, playhead: Option<usize>) -> Vec<Wanted> {
    let mut out = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut push = |out: &mut Vec<Wanted>, group: Group, item: usize, frame: usize| {
        if seen.insert((item, frame)) {
            let rank = out.len();
            out.push(Wanted { group, item, frame, rank });
        }
    };

    if let Some(p) = playhead {
        // Nothing lies farther than the timeline length in either direction
        let reach = input.lookahead.max(input.lookbehind).min(timeline.total());
        for d in 0..=reach {
            let ahead = (d <= input.lookahead).then(|| p.checked_add(d)).flatten();
            let behind = (d >= 1 && d <= input.lookbehind && d <= p).then(|| p - d);
            for (group, global) in [(Group::Forward, ahead), (Group::Backward, behind)] {
                if let Some((item, frame)) = global.and_then(|g| timeline.locate(g)) {
                    push(&mut out, group, item, frame);
                }
            }
        }
    }

    for (n, id) in input.selected.iter().enumerate() {
        if Some(*id) == input.position.item && playhead.is_some() {
            continue;
        }
        let Some(item) = input.items.iter().position(|i| i.id() == *id) else {
            continue;
        };
        let count = input.items[item].frame_count();
        for frame in 0..count.min(input.lookahead.saturating_add(1)) {
            push(&mut out, Group::Pinned(n), item, frame);
        }
    }

    out
}

/// Group uncached frames into contiguous ranges, closest range first
fn build_jobs(items: &[Arc<dyn MediaItem>], mut pending: Vec<Wanted>) -> Vec<CacheJob> {
    pending.sort_by_key(|w| (w.group, w.item, w.frame));

    // (group, item, first, last, best rank)
    let mut ranges: Vec<(Group, usize, usize, usize, usize)> = Vec::new();
    for w in pending {
        match ranges.last_mut() {
            Some(r) if r.0 == w.group && r.1 == w.item && r.3 + 1 == w.frame => {
                r.3 = w.frame;
                r.4 = r.4.min(w.rank);
            }
            _ => ranges.push((w.group, w.item, w.frame, w.frame, w.rank)),
        }
    }

    ranges.sort_by_key(|r| r.4);
    ranges
        .into_iter()
        .map(|(_, item, first, last, _)| CacheJob::new(Arc::clone(&items[item]), first, last))
        .collect()
}

/// Cached keys outside the admitted set, farthest first (stable on insertion order)
fn build_dequeue(
    cached: &[CacheKey],
    admitted: &HashSet<CacheKey>,
    timeline: &Timeline<'_>,
    playhead: Option<usize>,
) -> Vec<CacheKey> {
    let reference = playhead.unwrap_or(0);
    let mut removable: Vec<(usize, CacheKey)> = cached
        .iter()
        .filter(|k| !admitted.contains(k))
        .map(|k| {
            let distance = timeline
                .global(k.item, k.frame)
                .map(|g| g.abs_diff(reference))
                .unwrap_or(usize::MAX);
            (distance, *k)
        })
        .collect();

    // Stable: equal distances keep insertion order
    removable.sort_by(|a, b| b.0.cmp(&a.0));
    removable.into_iter().map(|(_, k)| k).collect()
}
