//! Cache engine: store, planner, worker, scheduler
//!
//! Independent of any UI. The scheduler is the only entry point the
//! foreground needs; the rest is exposed for tests and tooling.

pub mod cache_man;
pub mod frame_store;
pub mod planner;
pub mod rate;
pub mod scheduler;
pub mod state;
pub mod worker;

pub use cache_man::{CacheLevel, CacheManager};
pub use frame_store::{CacheKey, CacheStats, FrameStore};
pub use planner::{Plan, PlanInput};
pub use rate::{RateReporter, RateSample};
pub use scheduler::Scheduler;
pub use state::{WorkerAction, WorkerEvent, WorkerState};
pub use worker::{CacheJob, CacheWorker, RunSummary, WorkerMessage, WorkerRun};
