//! Cooperative tick scheduler.
//!
//! One logical thread drives all playback: a tick polls every suspended task
//! exactly once, in registration order. Tasks suspend only at named points
//! (awaiting a load, a timer, or an externally reported signal) and may
//! outlive the script instruction that spawned them, which is how a looping
//! effect keeps running after the cursor has moved on.
//!
//! The task list is snapshotted before polling and rebuilt afterwards, so
//! spawns and removals never invalidate the iteration. Grace-period work
//! (delayed resource release) is a scheduled continuation, never a blocking
//! wait.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;

/// Shared cancellation flag.
///
/// Cancelling is synchronous for the requester; the scheduler drops the task
/// at the next tick without polling it again, so a cancelled task never gets
/// another chance to mutate persistent state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Why a task is still suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Awaiting a resource load.
    Load,
    /// Awaiting a fixed number of ticks.
    Timer,
    /// Awaiting an externally reported signal (animation length).
    Signal,
}

/// Result of polling a task once.
pub enum TaskPoll {
    Pending(WaitReason),
    Complete,
    /// Finished, but with teardown that must wait out a grace period first.
    /// The scheduler runs `release` after `grace_ticks` ticks.
    CompleteAfter {
        grace_ticks: u32,
        release: Box<dyn FnOnce()>,
    },
}

/// A suspended unit of playback, stepped once per tick.
pub trait PlaybackTask {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn step(&mut self) -> TaskPoll;
}

struct Entry {
    task: Box<dyn PlaybackTask>,
    cancel: CancelToken,
}

struct Continuation {
    remaining: u32,
    run: Box<dyn FnOnce()>,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Entry>,
    continuations: Vec<Continuation>,
    ticks: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, task: Box<dyn PlaybackTask>, cancel: CancelToken) {
        debug!("spawning task {}", task.name());
        self.tasks.push(Entry { task, cancel });
    }

    /// Runs `run` after `delay` ticks; a delay of one fires on the next
    /// tick, and zero is treated as one.
    pub fn after_ticks(&mut self, delay: u32, run: Box<dyn FnOnce()>) {
        self.continuations.push(Continuation {
            remaining: delay.max(1),
            run,
        });
    }

    /// One scheduling point: fire due continuations, then poll every live
    /// task once in registration order.
    pub fn tick(&mut self) {
        self.ticks += 1;

        let mut waiting = Vec::new();
        for mut continuation in std::mem::take(&mut self.continuations) {
            continuation.remaining -= 1;
            if continuation.remaining == 0 {
                (continuation.run)();
            } else {
                waiting.push(continuation);
            }
        }
        // Continuations scheduled by the runs above land behind the survivors.
        waiting.append(&mut self.continuations);
        self.continuations = waiting;

        let mut survivors = Vec::new();
        for mut entry in std::mem::take(&mut self.tasks) {
            if entry.cancel.is_cancelled() {
                debug!("dropping cancelled task {}", entry.task.name());
                continue;
            }
            match entry.task.step() {
                TaskPoll::Pending(_) => survivors.push(entry),
                TaskPoll::Complete => {
                    debug!("task {} complete", entry.task.name());
                }
                TaskPoll::CompleteAfter {
                    grace_ticks,
                    release,
                } => {
                    debug!(
                        "task {} complete, releasing after {} ticks",
                        entry.task.name(),
                        grace_ticks
                    );
                    self.continuations.push(Continuation {
                        remaining: grace_ticks.max(1),
                        run: release,
                    });
                }
            }
        }
        // Tasks spawned while polling ran keep their registration order
        // behind the survivors.
        survivors.append(&mut self.tasks);
        self.tasks = survivors;
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_continuations(&self) -> usize {
        self.continuations.len()
    }

    /// True when nothing is suspended and no continuation is waiting.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.continuations.is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
