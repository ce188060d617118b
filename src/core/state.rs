//! Worker lifecycle state machine
//!
//! Four states, one pure transition function. The scheduler feeds events in
//! and performs the returned action; nothing else changes the state.
//!
//! ```text
//! Idle           --JobsAvailable-->  Running          (start run)
//! Running        --Invalidated---->  IntReqRestart    (interrupt)
//! Running        --StopRequested-->  IntReqStop       (interrupt)
//! Running        --Finished------->  Idle             (rebuild, maybe start again)
//! IntReqStop     --Finished------->  Idle
//! IntReqRestart  --Finished------->  Idle -> Running  (rebuild + start)
//! ```

use serde::Serialize;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WorkerState {
    /// No run in flight. A new queue may be installed.
    #[default]
    Idle,
    /// A run is in flight.
    Running,
    /// Interruption requested; go Idle when the worker acknowledges.
    InterruptRequestedStop,
    /// Interruption requested; rebuild the queue and start again on acknowledge.
    InterruptRequestedRestart,
}

/// Input of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Recompute (while idle) produced a non-empty queue
    JobsAvailable,
    /// Recompute (while idle) produced nothing to do
    NoJobs,
    /// Playlist/playback/selection changed or an item is being deleted
    Invalidated,
    /// Plain cancellation (shutdown)
    StopRequested,
    /// The worker reported completion of the current run (natural or interrupted)
    Finished,
}

/// What the scheduler has to do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Nothing,
    /// Install the freshly computed queue and start a run
    Start,
    /// Ask the running worker to stop at the next frame boundary
    Interrupt,
    /// Recompute the queue, then feed `JobsAvailable` / `NoJobs`
    Rebuild,
}

impl WorkerState {
    /// Transition table. Returns (next state, action).
    pub fn on(self, event: WorkerEvent) -> (WorkerState, WorkerAction) {
        use WorkerAction as A;
        use WorkerEvent as E;
        use WorkerState as S;

        match (self, event) {
            (S::Idle, E::JobsAvailable) => (S::Running, A::Start),
            (S::Idle, E::NoJobs) => (S::Idle, A::Nothing),
            (S::Idle, E::Invalidated) => (S::Idle, A::Rebuild),
            (S::Idle, E::StopRequested) => (S::Idle, A::Nothing),

            (S::Running, E::Invalidated) => (S::InterruptRequestedRestart, A::Interrupt),
            (S::Running, E::StopRequested) => (S::InterruptRequestedStop, A::Interrupt),
            // Natural finish: go idle, then look for more work
            (S::Running, E::Finished) => (S::Idle, A::Rebuild),

            (S::InterruptRequestedStop, E::Finished) => (S::Idle, A::Nothing),
            (S::InterruptRequestedStop, E::Invalidated) => (S::InterruptRequestedRestart, A::Nothing),

            (S::InterruptRequestedRestart, E::Finished) => (S::Idle, A::Rebuild),
            (S::InterruptRequestedRestart, E::StopRequested) => (S::InterruptRequestedStop, A::Nothing),
            (S::InterruptRequestedRestart, E::Invalidated) => (S::InterruptRequestedRestart, A::Nothing),

            // Queue results only matter while idle; a stray completion changes nothing
            (state, E::JobsAvailable | E::NoJobs) => (state, A::Nothing),
            (S::Idle, E::Finished) => (S::Idle, A::Nothing),
            (S::InterruptRequestedStop, E::StopRequested) => (S::InterruptRequestedStop, A::Nothing),
        }
    }

    /// A run is in flight (the worker has not acknowledged yet)
    pub fn is_busy(&self) -> bool {
        !matches!(self, WorkerState::Idle)
    }
}
