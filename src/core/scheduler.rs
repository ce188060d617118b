//! Cache scheduler
//!
//! **Why**: Playback, selection and playlist edits all change which frames
//! should be resident. The scheduler turns those notifications into a plan
//! and drives the single background worker through the [`WorkerState`]
//! machine, so at most one run is ever in flight and a new queue is only
//! installed after the previous run has acknowledged completion.
//!
//! **Used by**: the application's foreground loop (notifications + `poll()`)
//!
//! # Flow
//!
//! ```text
//! notify_*() -> Invalidated -> (Idle) rebuild -> JobsAvailable -> start run
//!                           -> (Running) interrupt -> Finished -> rebuild
//! poll() -> worker messages -> rate / failures / Finished
//! ```
//!
//! All methods run on the foreground. The only blocking calls are the
//! deletion handshake, [`Scheduler::shutdown`] and [`Scheduler::wait_idle`],
//! each bounded by one frame decode of the worker.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use log::{debug, info, trace, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::core::cache_man::CacheManager;
use crate::core::frame_store::{CacheKey, FrameStore};
use crate::core::planner::{self, Plan, PlanInput};
use crate::core::rate::{RateReporter, RateSample};
use crate::core::state::{WorkerAction, WorkerEvent, WorkerState};
use crate::core::worker::{CacheJob, CacheWorker, RunSummary, WorkerMessage, WorkerRun};
use crate::entities::{MediaItem, PlaybackPosition, PlaybackSource, Playlist};
use crate::status::{CacheStatus, ItemCacheStatus, cached_ranges};

pub struct Scheduler {
    playlist: Arc<dyn Playlist>,
    playback: Arc<dyn PlaybackSource>,
    config: CacheConfig,
    manager: Arc<CacheManager>,
    store: Arc<FrameStore>,
    rate: Arc<RateReporter>,
    worker: CacheWorker,
    messages: Receiver<WorkerMessage>,
    state: WorkerState,
    /// Plan from the last rebuild, installed on Start
    pending: Option<Plan>,
    /// Jobs of the run in flight, or of the last run
    dispatched: Vec<CacheJob>,
    /// Epoch of the run in flight
    dispatched_epoch: Option<u64>,
    /// Jobs of a run that just finished naturally
    finished_jobs: Option<Vec<CacheJob>>,
    failed_frames: HashSet<CacheKey>,
    failed_items: HashSet<Uuid>,
    /// Items announced for deletion
    removed: HashSet<Uuid>,
    /// Position used by the last plan
    planned_position: Option<PlaybackPosition>,
}

impl Scheduler {
    /// Create the frame store and spawn the worker. Nothing is cached until
    /// the first notification.
    pub fn new(
        playlist: Arc<dyn Playlist>,
        playback: Arc<dyn PlaybackSource>,
        config: CacheConfig,
    ) -> Result<Self> {
        let manager = Arc::new(CacheManager::new(config.budget_bytes()));
        let store = Arc::new(FrameStore::new(Arc::clone(&manager)));
        let (tx, rx) = unbounded();
        let worker = CacheWorker::spawn(Arc::clone(&store), tx, config.rate_interval())
            .context("Failed to spawn cache worker thread")?;

        info!(
            "Cache scheduler started: budget {} MB, window -{}/+{} frames",
            manager.limit() / 1024 / 1024,
            config.lookbehind_frames,
            config.lookahead_frames
        );

        Ok(Self {
            playlist,
            playback,
            config,
            manager,
            store,
            rate: Arc::new(RateReporter::new()),
            worker,
            messages: rx,
            state: WorkerState::Idle,
            pending: None,
            dispatched: Vec::new(),
            dispatched_epoch: None,
            finished_jobs: None,
            failed_frames: HashSet::new(),
            failed_items: HashSet::new(),
            removed: HashSet::new(),
            planned_position: None,
        })
    }

    // === Notifications ===

    /// Items were added, removed or reordered
    pub fn notify_playlist_changed(&mut self) {
        let present: HashSet<Uuid> = self.playlist.items().iter().map(|i| i.id()).collect();
        // Deleted items that are gone from the playlist need no exclusion anymore
        self.removed.retain(|id| present.contains(id));
        self.failed_frames.clear();
        self.failed_items.clear();
        self.invalidate("playlist changed");
    }

    pub fn notify_selection_changed(&mut self) {
        self.invalidate("selection changed");
    }

    /// Playhead moved. Replans only when the item or play state changed, or
    /// the frame moved by at least `recompute_threshold_frames`.
    pub fn notify_playback_tick(&mut self) {
        let pos = self.playback.position();
        let moved = match self.planned_position {
            None => true,
            Some(last) => {
                last.item != pos.item
                    || last.playing != pos.playing
                    || last.frame.abs_diff(pos.frame) >= self.config.recompute_threshold_frames.max(1)
            }
        };
        if moved {
            self.invalidate("playback moved");
        } else {
            trace!("Playback tick below threshold: frame {}", pos.frame);
        }
    }

    /// Drop all frames of `item` and keep it out of every later plan.
    ///
    /// If the running job queue touches the item, the worker is interrupted
    /// and this call blocks until it acknowledges. The store holds no frame
    /// of the item when this returns.
    pub fn notify_item_about_to_be_deleted(&mut self, item: Uuid) {
        self.removed.insert(item);
        self.failed_items.remove(&item);
        self.failed_frames.retain(|k| k.item != item);

        let in_flight = self.dispatched_epoch.is_some() && self.dispatched.iter().any(|j| j.item_id() == item);
        // Release our references; the worker keeps its own until it acknowledges
        self.dispatched.retain(|j| j.item_id() != item);
        self.finished_jobs = None;
        if !in_flight {
            let dropped = self.store.invalidate_for(item);
            debug!("Item {} deleted: {} cached frames dropped", item, dropped);
            self.invalidate("item deleted");
            return;
        }

        debug!("Item {} deleted while being cached, interrupting worker", item);
        self.handle(WorkerEvent::Invalidated);
        self.worker.request_interruption();

        let summary = self.wait_for_completion();
        let dropped = self.store.invalidate_for(item);
        debug!("Item {} deleted: {} cached frames dropped", item, dropped);

        match summary {
            Some(summary) => self.on_worker_finished(summary),
            None => self.worker_lost(),
        }
    }

    /// Replan now
    pub fn request_recompute(&mut self) {
        self.invalidate("recompute requested");
    }

    /// Apply a new configuration and replan
    pub fn set_config(&mut self, config: CacheConfig) {
        if config.rate_interval_ms != self.config.rate_interval_ms {
            warn!("rate_interval_ms changes apply after restart");
        }
        self.manager.set_limit(config.budget_bytes());
        self.config = config;
        self.invalidate("config changed");
    }

    // === Worker messages ===

    /// Worker acknowledged a run (natural or interrupted)
    pub fn on_worker_finished(&mut self, summary: RunSummary) {
        if self.dispatched_epoch != Some(summary.epoch) {
            debug!(
                "Ignoring completion of run {} (current {:?})",
                summary.epoch, self.dispatched_epoch
            );
            return;
        }
        self.dispatched_epoch = None;

        if self.state == WorkerState::Running {
            self.finished_jobs = Some(self.dispatched.clone());
        }
        self.handle(WorkerEvent::Finished);
    }

    pub fn on_rate_sample(&mut self, sample: RateSample) {
        self.rate.record(sample);
    }

    /// Drain pending worker messages without blocking. Returns how many
    /// were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.messages.try_recv() {
            self.dispatch(msg);
            handled += 1;
        }
        handled
    }

    /// Handle messages until the worker is idle. Returns false on timeout.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.messages.recv_timeout(remaining) {
                Ok(msg) => self.dispatch(msg),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_lost();
                    break;
                }
            }
        }
        self.poll();
        !self.state.is_busy()
    }

    /// Cancel the current run and wait for the worker to acknowledge
    pub fn shutdown(&mut self) {
        if !self.state.is_busy() {
            return;
        }
        self.handle(WorkerEvent::StopRequested);
        while self.state.is_busy() {
            match self.wait_for_completion() {
                Some(summary) => self.on_worker_finished(summary),
                None => self.worker_lost(),
            }
        }
        info!("Cache scheduler stopped");
    }

    // === Accessors ===

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    pub fn rate(&self) -> &Arc<RateReporter> {
        &self.rate
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Jobs of the run in flight, or of the last dispatched run
    pub fn queue(&self) -> &[CacheJob] {
        &self.dispatched
    }

    /// Epoch of the most recently dispatched run (0 before the first)
    pub fn epoch(&self) -> u64 {
        self.manager.current_epoch()
    }

    pub fn status(&self) -> CacheStatus {
        let level = self.store.level();
        let items = self
            .playlist
            .items()
            .iter()
            .filter(|item| !self.removed.contains(&item.id()))
            .map(|item| ItemCacheStatus {
                id: item.id(),
                name: item.name().to_string(),
                frame_count: item.frame_count(),
                cached_ranges: cached_ranges(&self.store.item_frames(item.id())),
            })
            .collect();

        CacheStatus {
            used_bytes: level.current,
            max_bytes: level.max,
            rate_bytes_per_ms: self.rate.rate_bytes_per_ms(),
            smoothed_rate_bytes_per_ms: self.rate.smoothed_bytes_per_ms(),
            state: self.state,
            cached_frames: self.store.len(),
            queued_jobs: if self.state.is_busy() { self.dispatched.len() } else { 0 },
            items,
        }
    }

    // === Internals ===

    fn invalidate(&mut self, reason: &str) {
        debug!("Cache invalidated: {} ({:?})", reason, self.state);
        self.handle(WorkerEvent::Invalidated);
    }

    fn handle(&mut self, event: WorkerEvent) {
        let (next, action) = self.state.on(event);
        if next != self.state {
            debug!("Worker state {:?} -> {:?} on {:?}", self.state, next, event);
        } else if event == WorkerEvent::Finished && action == WorkerAction::Nothing {
            debug!("Stray completion in {:?}", self.state);
        }
        self.state = next;

        match action {
            WorkerAction::Nothing => {}
            WorkerAction::Interrupt => self.worker.request_interruption(),
            WorkerAction::Rebuild => self.rebuild(),
            WorkerAction::Start => self.start_run(),
        }
    }

    /// Replan while idle, then feed JobsAvailable / NoJobs
    fn rebuild(&mut self) {
        let plan = self.plan();

        // Worker is idle here, so trimming from the foreground is safe
        if self.store.level().is_over_budget() {
            let mut dequeue: VecDeque<CacheKey> = plan.dequeue.iter().copied().collect();
            let evicted = self.store.evict_to_budget(&mut dequeue);
            debug!("Trimmed {} frames to the new budget", evicted);
        }

        let repeated = self
            .finished_jobs
            .take()
            .is_some_and(|jobs| plan.same_jobs(&jobs));
        if repeated {
            debug!("Plan repeats the finished run, staying idle");
        }

        let event = if plan.jobs.is_empty() || repeated {
            WorkerEvent::NoJobs
        } else {
            WorkerEvent::JobsAvailable
        };
        self.pending = Some(plan);
        self.handle(event);
    }

    fn plan(&mut self) -> Plan {
        let items: Vec<Arc<dyn MediaItem>> = self
            .playlist
            .items()
            .into_iter()
            .filter(|item| !self.removed.contains(&item.id()))
            .collect();
        let selected: Vec<Uuid> = self
            .playlist
            .selected()
            .into_iter()
            .filter(|id| !self.removed.contains(id))
            .collect();
        let position = self.playback.position();
        let cached = self.store.keys();

        let plan = planner::plan(&PlanInput {
            items: &items,
            selected: &selected,
            position,
            lookahead: self.config.lookahead_frames,
            lookbehind: self.config.lookbehind_frames,
            budget: self.manager.limit(),
            cached: &cached,
            failed_frames: &self.failed_frames,
            failed_items: &self.failed_items,
        });
        self.planned_position = Some(position);

        debug!(
            "Plan at {:?}: {} jobs, {}/{} frames admitted, {} removable",
            plan.playhead,
            plan.jobs.len(),
            plan.admitted,
            plan.wanted,
            plan.dequeue.len()
        );
        plan
    }

    fn start_run(&mut self) {
        let Some(plan) = self.pending.take() else {
            warn!("Start without a plan");
            self.state = WorkerState::Idle;
            return;
        };

        self.worker.reset_interruption();
        let epoch = self.manager.increment_epoch();
        let run = WorkerRun {
            epoch,
            queue: plan.jobs.iter().cloned().collect(),
            dequeue: plan.dequeue.into_iter().collect(),
            level: self.store.level(),
        };
        self.dispatched = plan.jobs;

        if self.worker.start(run) {
            self.dispatched_epoch = Some(epoch);
            debug!("Run {} dispatched: {:?}", epoch, self.dispatched);
        } else {
            self.worker_lost();
        }
    }

    fn dispatch(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Rate(sample) => self.on_rate_sample(sample),
            WorkerMessage::FrameFailed { key, error } => {
                if !self.removed.contains(&key.item) {
                    debug!("Frame {}:{} excluded: {}", key.item, key.frame, error);
                    self.failed_frames.insert(key);
                }
            }
            WorkerMessage::JobAborted { item, frame, error } => {
                if !self.removed.contains(&item) {
                    warn!("Item {} excluded from caching (frame {}): {}", item, frame, error);
                    self.failed_items.insert(item);
                }
            }
            WorkerMessage::Finished(summary) => self.on_worker_finished(summary),
        }
    }

    /// Block until the completion of the run in flight, handling other
    /// messages on the way. The completion itself is returned unprocessed.
    fn wait_for_completion(&mut self) -> Option<RunSummary> {
        loop {
            match self.messages.recv() {
                Ok(WorkerMessage::Finished(summary)) if Some(summary.epoch) == self.dispatched_epoch => {
                    return Some(summary);
                }
                Ok(msg) => self.dispatch(msg),
                Err(_) => return None,
            }
        }
    }

    fn worker_lost(&mut self) {
        warn!("Cache worker unavailable, caching stopped");
        self.dispatched_epoch = None;
        self.pending = None;
        self.state = WorkerState::Idle;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PlaybackTracker, PlaylistModel, TestPattern};

    const WAIT: Duration = Duration::from_secs(10);

    struct Fixture {
        playlist: Arc<PlaylistModel>,
        playback: Arc<PlaybackTracker>,
        scheduler: Scheduler,
    }

    fn config(max: usize, lookahead: usize, lookbehind: usize) -> CacheConfig {
        CacheConfig {
            max_cache_bytes: max,
            lookahead_frames: lookahead,
            lookbehind_frames: lookbehind,
            recompute_threshold_frames: 8,
            rate_interval_ms: 10,
            ..Default::default()
        }
    }

    fn fixture(config: CacheConfig) -> Fixture {
        let playlist = Arc::new(PlaylistModel::new());
        let playback = Arc::new(PlaybackTracker::new());
        let scheduler = Scheduler::new(playlist.clone(), playback.clone(), config).unwrap();
        Fixture { playlist, playback, scheduler }
    }

    fn add(f: &Fixture, pattern: TestPattern) -> Arc<TestPattern> {
        let item = Arc::new(pattern);
        f.playlist.push(item.clone());
        item
    }

    fn ranges(s: &Scheduler) -> Vec<(Uuid, usize, usize)> {
        s.queue().iter().map(|j| (j.item_id(), j.first, j.last)).collect()
    }

    #[test]
    fn test_window_cached_after_run() {
        let mut f = fixture(config(1_000_000, 10, 0));
        let a = add(&f, TestPattern::sized("a", 100, 100));
        f.playback.seek(a.id(), 10);

        f.scheduler.notify_playlist_changed();
        assert_eq!(f.scheduler.state(), WorkerState::Running);
        assert_eq!(ranges(&f.scheduler), vec![(a.id(), 10, 20)]);

        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().item_frames(a.id()), (10..=20).collect::<Vec<_>>());
        assert_eq!(f.scheduler.store().level().current, 11 * 100);
        // Everything admitted is cached: no second run
        assert_eq!(f.scheduler.epoch(), 1);
        assert_eq!(f.scheduler.rate().total_bytes(), 11 * 100);
        assert!(f.scheduler.rate().sample_count() >= 1);
    }

    #[test]
    fn test_jump_interrupts_and_restarts() {
        let mut f = fixture(config(1_000_000, 10, 0));
        let a = add(&f, TestPattern::sized("a", 100, 100).with_delay(Duration::from_millis(5)));
        f.playback.seek(a.id(), 5);
        f.scheduler.notify_playlist_changed();
        assert_eq!(ranges(&f.scheduler), vec![(a.id(), 5, 15)]);
        assert_eq!(f.scheduler.state(), WorkerState::Running);

        assert_eq!(f.scheduler.status().queued_jobs, 1);

        f.playback.seek(a.id(), 50);
        f.scheduler.notify_playback_tick();
        assert_eq!(f.scheduler.state(), WorkerState::InterruptRequestedRestart);
        // Old queue stays installed until the worker acknowledges
        assert_eq!(ranges(&f.scheduler), vec![(a.id(), 5, 15)]);

        assert!(f.scheduler.wait_idle(WAIT));
        let store = f.scheduler.store();
        assert!((50..=60).all(|i| store.contains(CacheKey::new(a.id(), i))));
        // Last run planned around frame 50 (partially cached frames are skipped)
        let queue = ranges(&f.scheduler);
        assert!(queue.iter().all(|&(_, first, last)| first >= 50 && last <= 60), "{:?}", queue);
    }

    #[test]
    fn test_latest_notification_wins() {
        let mut f = fixture(config(1_000_000, 5, 0));
        let a = add(&f, TestPattern::sized("a", 200, 100).with_delay(Duration::from_millis(2)));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();

        for frame in [50, 120, 30] {
            f.playback.seek(a.id(), frame);
            f.scheduler.notify_playback_tick();
            assert!(f.scheduler.state().is_busy());
        }
        assert!(f.scheduler.wait_idle(WAIT));

        let store = f.scheduler.store();
        assert!((30..=35).all(|i| store.contains(CacheKey::new(a.id(), i))));
        // Intermediate positions were never dispatched
        assert!(!store.contains(CacheKey::new(a.id(), 50)));
        assert!(!store.contains(CacheKey::new(a.id(), 120)));
    }

    #[test]
    fn test_budget_keeps_nearest_frames() {
        // 1000 bytes budget, 100 bytes per frame, 15 frames wanted
        let mut f = fixture(config(1000, 14, 0));
        let a = add(&f, TestPattern::sized("a", 100, 100));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));

        let store = f.scheduler.store();
        assert_eq!(store.item_frames(a.id()), (0..10).collect::<Vec<_>>());
        assert_eq!(store.level().current, 1000);

        // Jump: the far frames go first, usage never ends above budget
        f.playback.seek(a.id(), 5);
        // Below the tick threshold
        f.scheduler.notify_playback_tick();
        assert_eq!(f.scheduler.state(), WorkerState::Idle);
        f.scheduler.request_recompute();
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().item_frames(a.id()), (5..15).collect::<Vec<_>>());
        assert!(f.scheduler.store().level().current <= 1000);
    }

    #[test]
    fn test_delete_in_flight_item() {
        let mut f = fixture(config(10_000_000, 500, 0));
        let a = add(&f, TestPattern::sized("a", 1000, 100).with_delay(Duration::from_millis(2)));
        let b = add(&f, TestPattern::sized("b", 10, 100));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        std::thread::sleep(Duration::from_millis(20));

        f.scheduler.notify_item_about_to_be_deleted(a.id());
        assert!(f.scheduler.store().item_frames(a.id()).is_empty());
        assert!(f.scheduler.queue().iter().all(|j| j.item_id() != a.id()));

        f.playlist.remove(a.id());
        f.playback.clear();
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));
        assert!(f.scheduler.store().item_frames(a.id()).is_empty());
        assert!(f.scheduler.status().items.iter().all(|i| i.id == b.id()));
    }

    #[test]
    fn test_delete_idle_item() {
        let mut f = fixture(config(1_000_000, 5, 0));
        let a = add(&f, TestPattern::sized("a", 10, 100));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().len(), 6);

        f.scheduler.notify_item_about_to_be_deleted(a.id());
        assert_eq!(f.scheduler.state(), WorkerState::Idle);
        assert!(f.scheduler.store().is_empty());
    }

    #[test]
    fn test_empty_plan_stays_idle() {
        let mut f = fixture(config(1_000_000, 5, 0));
        add(&f, TestPattern::sized("a", 10, 100));
        f.scheduler.request_recompute();
        assert_eq!(f.scheduler.state(), WorkerState::Idle);
        assert_eq!(f.scheduler.epoch(), 0);
        assert_eq!(f.scheduler.status().queued_jobs, 0);
    }

    #[test]
    fn test_pinned_item_without_playback() {
        let mut f = fixture(config(1_000_000, 3, 0));
        add(&f, TestPattern::sized("a", 10, 100));
        let b = add(&f, TestPattern::sized("b", 10, 100));
        f.playlist.select(&[b.id()]);
        f.scheduler.notify_selection_changed();
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().item_frames(b.id()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_failures_do_not_loop() {
        let mut f = fixture(config(1_000_000, 9, 0));
        let a = add(&f, TestPattern::sized("a", 10, 100).with_failing_frames(&[3]));
        let b = add(&f, TestPattern::sized("b", 10, 100).with_source_failure_at(1));
        f.playback.seek(a.id(), 0);
        f.playlist.select(&[b.id()]);
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));

        assert_eq!(f.scheduler.store().item_frames(a.id()), vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);
        assert_eq!(a.decoded().iter().filter(|&&i| i == 3).count(), 1);
        assert_eq!(b.decode_count(), 2);

        // A playlist change gives failed frames another chance
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(a.decoded().iter().filter(|&&i| i == 3).count(), 2);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut f = fixture(config(1_000_000, 100, 0));
        let a = add(&f, TestPattern::sized("a", 200, 100).with_delay(Duration::from_millis(2)));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        assert_eq!(f.scheduler.state(), WorkerState::Running);

        f.scheduler.on_worker_finished(RunSummary { epoch: 999, ..Default::default() });
        assert_eq!(f.scheduler.state(), WorkerState::Running);
        assert!(f.scheduler.wait_idle(WAIT));
    }

    #[test]
    fn test_tick_threshold() {
        let mut f = fixture(config(1_000_000, 5, 0));
        let a = add(&f, TestPattern::sized("a", 100, 100));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playback_tick();
        assert!(f.scheduler.wait_idle(WAIT));
        let epoch = f.scheduler.epoch();

        f.playback.seek(a.id(), 3);
        f.scheduler.notify_playback_tick();
        assert_eq!(f.scheduler.epoch(), epoch);

        f.playback.seek(a.id(), 20);
        f.scheduler.notify_playback_tick();
        assert_eq!(f.scheduler.epoch(), epoch + 1);
        assert!(f.scheduler.wait_idle(WAIT));
    }

    #[test]
    fn test_shutdown_stops_run() {
        let mut f = fixture(config(10_000_000, 1000, 0));
        let a = add(&f, TestPattern::sized("a", 1000, 100).with_delay(Duration::from_millis(2)));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        f.scheduler.shutdown();
        assert_eq!(f.scheduler.state(), WorkerState::Idle);
        assert!(a.decode_count() < 1000);
    }

    #[test]
    fn test_lower_budget_trims_store() {
        let mut f = fixture(config(1000, 9, 0));
        let a = add(&f, TestPattern::sized("a", 100, 100));
        f.playback.seek(a.id(), 0);
        f.scheduler.notify_playlist_changed();
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().len(), 10);

        f.scheduler.set_config(config(500, 9, 0));
        assert!(f.scheduler.wait_idle(WAIT));
        assert_eq!(f.scheduler.store().item_frames(a.id()), vec![0, 1, 2, 3, 4]);
        assert_eq!(f.scheduler.status().max_bytes, 500);
    }
}
