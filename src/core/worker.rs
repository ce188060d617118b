//! Background cache worker
//!
//! One long-lived thread executes one run at a time. A run is a snapshot
//! handed over by the scheduler: job queue, dequeue list and cache level.
//! The worker never touches scheduler state; everything it has to say goes
//! through the message channel:
//!
//! - `Rate` every `rate_interval` of wall-clock time (and once at the end)
//! - `FrameFailed` / `JobAborted` on decode / source failures
//! - `Finished` exactly once per run, natural or interrupted
//!
//! Interruption is cooperative: the flag is checked between frames, never
//! while a frame is being decoded, so a store entry is always a whole frame.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::cache_man::CacheLevel;
use crate::core::frame_store::{CacheKey, FrameStore};
use crate::core::rate::RateSample;
use crate::entities::{CachedFrame, DecodeError, MediaItem};

/// Contiguous inclusive frame range of one item to cache
#[derive(Clone)]
pub struct CacheJob {
    pub item: Arc<dyn MediaItem>,
    pub first: usize,
    pub last: usize,
}

impl CacheJob {
    pub fn new(item: Arc<dyn MediaItem>, first: usize, last: usize) -> Self {
        debug_assert!(first <= last);
        Self { item, first, last }
    }

    pub fn item_id(&self) -> Uuid {
        self.item.id()
    }

    /// Number of frames in the range
    pub fn frame_count(&self) -> usize {
        self.last - self.first + 1
    }

    /// Same item and range (item identity, not pointer)
    pub fn same_work(&self, other: &CacheJob) -> bool {
        self.item_id() == other.item_id() && self.first == other.first && self.last == other.last
    }
}

impl fmt::Debug for CacheJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheJob({} [{}..={}])", self.item.name(), self.first, self.last)
    }
}

/// Snapshot handed to the worker for one run
#[derive(Debug)]
pub struct WorkerRun {
    pub epoch: u64,
    pub queue: VecDeque<CacheJob>,
    /// Most removable first
    pub dequeue: VecDeque<CacheKey>,
    /// Level at dispatch, for the run log only. Eviction checks the live
    /// budget of the store, which may change while the run is in flight.
    pub level: CacheLevel,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub epoch: u64,
    pub interrupted: bool,
    /// Frames decoded and inserted
    pub frames: usize,
    pub bytes: u64,
    pub evicted: usize,
    /// Frames skipped after a decode failure
    pub failed: usize,
    /// Jobs abandoned after a source failure
    pub aborted_jobs: usize,
}

/// Worker -> scheduler messages
#[derive(Debug)]
pub enum WorkerMessage {
    Rate(RateSample),
    FrameFailed { key: CacheKey, error: String },
    JobAborted { item: Uuid, frame: usize, error: String },
    Finished(RunSummary),
}

/// Handle to the background worker thread
pub struct CacheWorker {
    runs: Option<Sender<WorkerRun>>,
    interrupt: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CacheWorker {
    /// Spawn the worker thread.
    ///
    /// Completion and rate messages are sent to `messages`.
    pub fn spawn(
        store: Arc<FrameStore>,
        messages: Sender<WorkerMessage>,
        rate_interval: Duration,
    ) -> std::io::Result<Self> {
        let (runs_tx, runs_rx): (Sender<WorkerRun>, Receiver<WorkerRun>) = unbounded();
        let interrupt = Arc::new(AtomicBool::new(false));

        let ctx = RunContext {
            store,
            interrupt: Arc::clone(&interrupt),
            messages,
            rate_interval,
        };

        let handle = thread::Builder::new()
            .name("precache-worker".to_string())
            .spawn(move || {
                debug!("Cache worker started");
                while let Ok(run) = runs_rx.recv() {
                    let summary = ctx.execute(run);
                    if ctx.messages.send(WorkerMessage::Finished(summary)).is_err() {
                        break; // Scheduler gone
                    }
                }
                debug!("Cache worker stopped");
            })?;

        Ok(Self {
            runs: Some(runs_tx),
            interrupt,
            handle: Some(handle),
        })
    }

    /// Hand a run to the worker. Returns false if the worker thread is gone.
    pub fn start(&self, run: WorkerRun) -> bool {
        let Some(runs) = &self.runs else {
            return false;
        };
        match runs.send(run) {
            Ok(()) => true,
            Err(e) => {
                error!("Cache worker unavailable, run {} dropped", e.into_inner().epoch);
                false
            }
        }
    }

    /// Ask the current run to stop at the next frame boundary. Idempotent.
    pub fn request_interruption(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Clear the interruption flag before the next run. Idempotent.
    pub fn reset_interruption(&self) {
        self.interrupt.store(false, Ordering::Release);
    }

    pub fn is_interruption_requested(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }
}

impl Drop for CacheWorker {
    fn drop(&mut self) {
        self.request_interruption();
        // Closing the run channel ends the thread loop
        self.runs.take();
        #[allow(clippy::collapsible_if)]
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Cache worker thread panicked");
            }
        }
    }
}

/// Everything the worker thread owns
struct RunContext {
    store: Arc<FrameStore>,
    interrupt: Arc<AtomicBool>,
    messages: Sender<WorkerMessage>,
    rate_interval: Duration,
}

impl RunContext {
    fn execute(&self, run: WorkerRun) -> RunSummary {
        let WorkerRun { epoch, mut queue, mut dequeue, level } = run;
        debug!(
            "Run {} started: {} jobs, {} removable, level {}/{} bytes",
            epoch,
            queue.len(),
            dequeue.len(),
            level.current,
            level.max
        );

        let mut summary = RunSummary { epoch, ..Default::default() };
        let mut meter = RateMeter::new(self.rate_interval);

        'jobs: while let Some(job) = queue.pop_front() {
            let item_id = job.item_id();
            trace!("Run {}: {:?}", epoch, job);

            for frame_idx in job.first..=job.last {
                if self.interrupt.load(Ordering::Acquire) {
                    summary.interrupted = true;
                    break 'jobs;
                }

                let key = CacheKey::new(item_id, frame_idx);
                if self.store.contains(key) {
                    continue;
                }

                match decode_guarded(job.item.as_ref(), frame_idx) {
                    Ok(frame) => {
                        let bytes = frame.bytes();
                        self.store.insert(key, frame);
                        if self.store.level().is_over_budget() {
                            summary.evicted += self.store.evict_to_budget(&mut dequeue);
                        }
                        summary.frames += 1;
                        summary.bytes += bytes as u64;

                        if let Some(sample) = meter.add(bytes) {
                            let _ = self.messages.send(WorkerMessage::Rate(sample));
                        }
                    }
                    Err(e) if e.is_source_failure() => {
                        warn!("Caching {} aborted at frame {}: {}", job.item.name(), frame_idx, e);
                        summary.aborted_jobs += 1;
                        let _ = self.messages.send(WorkerMessage::JobAborted {
                            item: item_id,
                            frame: frame_idx,
                            error: e.to_string(),
                        });
                        continue 'jobs;
                    }
                    Err(e) => {
                        warn!("Skipping {} frame {}: {}", job.item.name(), frame_idx, e);
                        summary.failed += 1;
                        let _ = self.messages.send(WorkerMessage::FrameFailed {
                            key,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(sample) = meter.flush() {
            let _ = self.messages.send(WorkerMessage::Rate(sample));
        }

        debug!(
            "Run {} {}: {} frames ({} bytes), {} evicted, {} failed, {} jobs aborted",
            epoch,
            if summary.interrupted { "interrupted" } else { "finished" },
            summary.frames,
            summary.bytes,
            summary.evicted,
            summary.failed,
            summary.aborted_jobs
        );
        summary
    }
}

/// Decode one frame; a panicking decoder counts as a frame failure
fn decode_guarded(item: &dyn MediaItem, frame_idx: usize) -> Result<CachedFrame, DecodeError> {
    catch_unwind(AssertUnwindSafe(|| item.decode_frame(frame_idx))).unwrap_or_else(|_| {
        Err(DecodeError::Frame {
            frame: frame_idx,
            reason: "decoder panicked".to_string(),
        })
    })
}

/// Accumulates produced bytes into fixed wall-clock samples
struct RateMeter {
    interval: Duration,
    started: Instant,
    bytes: u64,
}

impl RateMeter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            bytes: 0,
        }
    }

    fn add(&mut self, bytes: usize) -> Option<RateSample> {
        self.bytes += bytes as u64;
        if self.started.elapsed() >= self.interval {
            self.take()
        } else {
            None
        }
    }

    /// Emit the partial interval, if anything was produced
    fn flush(&mut self) -> Option<RateSample> {
        if self.bytes == 0 { None } else { self.take() }
    }

    fn take(&mut self) -> Option<RateSample> {
        let sample = RateSample {
            bytes: self.bytes,
            elapsed: self.started.elapsed(),
        };
        self.started = Instant::now();
        self.bytes = 0;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache_man::CacheManager;
    use crate::entities::TestPattern;

    struct Harness {
        store: Arc<FrameStore>,
        worker: CacheWorker,
        messages: Receiver<WorkerMessage>,
    }

    fn harness(max: usize) -> Harness {
        let store = Arc::new(FrameStore::new(Arc::new(CacheManager::new(max))));
        let (tx, rx) = unbounded();
        let worker = CacheWorker::spawn(Arc::clone(&store), tx, Duration::from_millis(1000)).unwrap();
        Harness { store, worker, messages: rx }
    }

    fn run(epoch: u64, jobs: Vec<CacheJob>, dequeue: Vec<CacheKey>, max: usize) -> WorkerRun {
        WorkerRun {
            epoch,
            queue: jobs.into(),
            dequeue: dequeue.into(),
            level: CacheLevel { current: 0, max },
        }
    }

    /// Collect messages until the Finished of `epoch`
    fn wait_finished(rx: &Receiver<WorkerMessage>) -> (RunSummary, Vec<WorkerMessage>) {
        let mut others = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).expect("worker finished in time") {
                WorkerMessage::Finished(summary) => return (summary, others),
                msg => others.push(msg),
            }
        }
    }

    #[test]
    fn test_run_caches_range() {
        let h = harness(100_000);
        let item = Arc::new(TestPattern::sized("a", 30, 100));
        let id = item.id();

        assert!(h.worker.start(run(1, vec![CacheJob::new(item.clone(), 10, 20)], vec![], 100_000)));
        let (summary, others) = wait_finished(&h.messages);

        assert_eq!(summary.epoch, 1);
        assert!(!summary.interrupted);
        assert_eq!(summary.frames, 11);
        assert_eq!(h.store.item_frames(id), (10..=20).collect::<Vec<_>>());
        assert_eq!(h.store.level().current, 11 * 100);
        assert_eq!(item.decoded(), (10..=20).collect::<Vec<_>>());

        // Final partial rate sample
        assert!(others.iter().any(|m| matches!(m, WorkerMessage::Rate(s) if s.bytes == 1100)));
    }

    #[test]
    fn test_rate_samples_during_run() {
        let store = Arc::new(FrameStore::new(Arc::new(CacheManager::new(100_000))));
        let (tx, rx) = unbounded();
        let worker = CacheWorker::spawn(Arc::clone(&store), tx, Duration::from_millis(5)).unwrap();
        let item = Arc::new(TestPattern::sized("slow", 40, 100).with_delay(Duration::from_millis(2)));

        worker.start(run(1, vec![CacheJob::new(item, 0, 39)], vec![], 100_000));
        let (summary, others) = wait_finished(&rx);

        let samples: Vec<RateSample> = others
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::Rate(s) => Some(*s),
                _ => None,
            })
            .collect();
        // 40 frames x 2ms with a 5ms interval: periodic samples, not just the final flush
        assert!(samples.len() >= 3, "only {} rate samples", samples.len());
        assert!(samples.iter().all(|s| s.bytes > 0));
        assert_eq!(samples.iter().map(|s| s.bytes).sum::<u64>(), summary.bytes);
        assert_eq!(summary.bytes, 40 * 100);
    }

    #[test]
    fn test_decode_failure_skips_frame() {
        let h = harness(100_000);
        let item = Arc::new(TestPattern::sized("a", 10, 10).with_failing_frames(&[3]).with_panic_at(5));
        let id = item.id();

        h.worker.start(run(1, vec![CacheJob::new(item, 0, 9)], vec![], 100_000));
        let (summary, others) = wait_finished(&h.messages);

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.frames, 8);
        assert_eq!(h.store.item_frames(id), vec![0, 1, 2, 4, 6, 7, 8, 9]);
        let failed: Vec<usize> = others
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::FrameFailed { key, .. } => Some(key.frame),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![3, 5]);
    }

    #[test]
    fn test_source_failure_aborts_job_only() {
        let h = harness(100_000);
        let broken = Arc::new(TestPattern::sized("broken", 10, 10).with_source_failure_at(2));
        let fine = Arc::new(TestPattern::sized("fine", 10, 10));

        h.worker.start(run(
            1,
            vec![CacheJob::new(broken.clone(), 0, 9), CacheJob::new(fine.clone(), 0, 4)],
            vec![],
            100_000,
        ));
        let (summary, others) = wait_finished(&h.messages);

        assert_eq!(summary.aborted_jobs, 1);
        assert_eq!(h.store.item_frames(broken.id()), vec![0, 1]);
        assert_eq!(h.store.item_frames(fine.id()), vec![0, 1, 2, 3, 4]);
        // Nothing after the failing frame was attempted
        assert_eq!(broken.decoded(), vec![0, 1, 2]);
        assert!(others.iter().any(|m| matches!(m, WorkerMessage::JobAborted { frame: 2, .. })));
    }

    #[test]
    fn test_interruption_between_frames() {
        let h = harness(1_000_000);
        let item = Arc::new(TestPattern::sized("slow", 1000, 10).with_delay(Duration::from_millis(5)));
        let id = item.id();

        h.worker.start(run(7, vec![CacheJob::new(item.clone(), 0, 999)], vec![], 1_000_000));
        thread::sleep(Duration::from_millis(30));
        h.worker.request_interruption();
        h.worker.request_interruption();

        let (summary, _) = wait_finished(&h.messages);
        assert!(summary.interrupted);
        assert_eq!(summary.epoch, 7);
        assert!(summary.frames < 1000);
        // Every decoded frame made it into the store: no partial entries
        assert_eq!(h.store.item_frames(id).len(), summary.frames);
        assert_eq!(item.decode_count(), summary.frames);

        // Reset and run again: already cached frames are skipped
        h.worker.reset_interruption();
        assert!(!h.worker.is_interruption_requested());
        h.worker.start(run(8, vec![CacheJob::new(item.clone(), 0, 9)], vec![], 1_000_000));
        let (summary, _) = wait_finished(&h.messages);
        assert!(!summary.interrupted);
        assert!((0..10).all(|i| h.store.contains(CacheKey::new(id, i))));
    }

    #[test]
    fn test_eviction_uses_dequeue_list() {
        let h = harness(500);
        let old = Arc::new(TestPattern::sized("old", 5, 100));
        let new = Arc::new(TestPattern::sized("new", 5, 100));
        for i in 0..5 {
            h.store.insert(CacheKey::new(old.id(), i), old.decode_frame(i).unwrap());
        }

        // Old frames removable farthest-first: 4, 3, 2, 1, 0
        let dequeue: Vec<CacheKey> = (0..5).rev().map(|i| CacheKey::new(old.id(), i)).collect();
        h.worker.start(run(1, vec![CacheJob::new(new.clone(), 0, 2)], dequeue, 500));
        let (summary, _) = wait_finished(&h.messages);

        assert_eq!(summary.evicted, 3);
        assert_eq!(h.store.item_frames(old.id()), vec![0, 1]);
        assert_eq!(h.store.item_frames(new.id()), vec![0, 1, 2]);
        assert!(h.store.level().current <= 500);
    }

    #[test]
    fn test_eviction_follows_live_budget() {
        let h = harness(300);
        let old = Arc::new(TestPattern::sized("old", 3, 100));
        let new = Arc::new(TestPattern::sized("new", 2, 100));
        for i in 0..3 {
            h.store.insert(CacheKey::new(old.id(), i), old.decode_frame(i).unwrap());
        }

        // Run level claims a much larger budget than the store has
        let dequeue: Vec<CacheKey> = (0..3).rev().map(|i| CacheKey::new(old.id(), i)).collect();
        h.worker.start(run(1, vec![CacheJob::new(new.clone(), 0, 1)], dequeue, 1_000_000));
        let (summary, _) = wait_finished(&h.messages);

        assert_eq!(summary.evicted, 2);
        assert_eq!(h.store.item_frames(old.id()), vec![0]);
        assert_eq!(h.store.level().current, 300);
    }
}
