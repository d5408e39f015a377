//! One-shot timers and fire-and-forget task tracking.
//!
//! Everything here runs on the current thread: spawning goes through
//! `tokio::task::spawn_local`, so callers must be inside a
//! [`tokio::task::LocalSet`].

use core::cell::{Cell, RefCell};
use core::future::Future;
use core::time::Duration;
use std::rc::Rc;

use anyhow::Error;
use log::{trace, warn};
use tokio::task::{JoinHandle, spawn_local};
use tokio::time::sleep;

pub type TimerTask = Box<dyn FnOnce()>;

/// Handle to a scheduled one-shot task.
#[derive(Clone, Debug, Default)]
pub struct ScheduledTask {
    cancelled: Rc<Cell<bool>>,
    delay: Duration,
}

impl ScheduledTask {
    fn new(delay: Duration) -> Self {
        Self {
            cancelled: Rc::default(),
            delay,
        }
    }

    /// Prevent the task from running. Has no effect once it ran.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

pub trait Timer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> ScheduledTask;
}

/// Timer backed by the tokio clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> ScheduledTask {
        let handle = ScheduledTask::new(delay);
        let guard = handle.clone();
        drop(spawn_local(async move {
            sleep(delay).await;
            if guard.is_cancelled() {
                trace!("timer task cancelled before firing");
                return;
            }
            task();
        }));
        handle
    }
}

struct PendingTask {
    due: Duration,
    seq: u64,
    handle: ScheduledTask,
    task: TimerTask,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTask>,
}

/// Deterministic timer: nothing runs until [`ManualTimer::advance`].
#[derive(Clone, Default)]
pub struct ManualTimer {
    clock: Rc<RefCell<ManualClock>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// Delays of every task still waiting to run, in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let clock = self.clock.borrow();
        clock
            .pending
            .iter()
            .filter(|pending| !pending.handle.is_cancelled())
            .map(|pending| pending.handle.delay())
            .collect()
    }

    /// Move the clock forward and run every task that became due, earliest
    /// first. Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let mut clock = self.clock.borrow_mut();
            clock.now += by;
            clock.now
        };
        let mut ran = 0;
        while let Some(next) = self.pop_due(target) {
            if !next.handle.is_cancelled() {
                (next.task)();
                ran += 1;
            }
        }
        ran
    }

    fn pop_due(&self, target: Duration) -> Option<PendingTask> {
        let mut clock = self.clock.borrow_mut();
        let index = clock
            .pending
            .iter()
            .enumerate()
            .filter(|(_, pending)| pending.due <= target)
            .min_by_key(|(_, pending)| (pending.due, pending.seq))
            .map(|(index, _)| index)?;
        Some(clock.pending.swap_remove(index))
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> ScheduledTask {
        let handle = ScheduledTask::new(delay);
        let mut clock = self.clock.borrow_mut();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now + delay;
        clock.pending.push(PendingTask {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

/// Fire-and-forget futures spawned on the local set. Failures are logged,
/// never propagated to the phase that started them.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Rc<RefCell<Vec<(&'static str, JoinHandle<Result<(), Error>>)>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, label: &'static str, future: F)
    where
        F: Future<Output = Result<(), Error>> + 'static,
    {
        trace!("spawning background task {label}");
        let handle = spawn_local(future);
        self.handles.borrow_mut().push((label, handle));
    }

    pub fn pending(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Wait for every task spawned so far, including tasks spawned by the
    /// tasks being awaited.
    pub async fn settle(&self) {
        loop {
            let batch: Vec<_> = self.handles.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            for (label, handle) in batch {
                match handle.await {
                    Ok(Ok(())) => trace!("background task {label} finished"),
                    Ok(Err(err)) => warn!("background task {label} failed: {err}"),
                    Err(err) => warn!("background task {label} did not complete: {err}"),
                }
            }
        }
    }
}
