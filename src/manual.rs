//! A hand-cranked executor for deterministic tests.
//!
//! Nothing happens until the test says so: `spawn`ed work waits for
//! [`ManualExecutor::run_spawned`], delayed work waits for the virtual clock
//! to be moved with [`ManualExecutor::advance`].
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use log::trace;
use parking_lot::Mutex;

use crate::executor::{run_job, Executor, Job, Scheduled};

/// # Examples
///
/// ```
/// use pledges::{manual::ManualExecutor, Pledge, PledgeConfig, PledgeState};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let executor = Arc::new(ManualExecutor::new());
/// let config = PledgeConfig::new().executor(executor.clone());
/// let (pledge, _settler) = Pledge::<u8>::pending_with(&config);
///
/// executor.advance(Duration::from_millis(9));
/// assert_eq!(pledge.state(), PledgeState::Pending);
/// executor.advance(Duration::from_millis(1));
/// assert_eq!(pledge.state(), PledgeState::Rejected);
/// ```
#[derive(Default)]
pub struct ManualExecutor {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    now: Duration,
    seq: u64,
    timers: BinaryHeap<Scheduled<Duration>>,
    spawned: VecDeque<Job>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.lock().timers.len()
    }

    pub fn pending_spawned(&self) -> usize {
        self.inner.lock().spawned.len()
    }

    /// Runs queued `spawn` work, including work queued while running.
    /// Returns how many jobs ran.
    pub fn run_spawned(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.inner.lock().spawned.pop_front();
            match job {
                Some(job) => {
                    run_job(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Moves the clock forward by `by`, running every timer that falls due on
    /// the way in deadline order. Timers scheduled by those jobs run too when
    /// they land inside the window. Returns how many timers ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.inner.lock().now + by;
        let mut ran = 0;
        loop {
            let job = {
                let mut inner = self.inner.lock();
                if inner
                    .timers
                    .peek()
                    .is_some_and(|timer| timer.deadline <= target)
                {
                    inner.timers.pop().map(|timer| {
                        inner.now = inner.now.max(timer.deadline);
                        timer.job
                    })
                } else {
                    inner.now = target;
                    None
                }
            };
            match job {
                Some(job) => {
                    run_job(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Alternates between spawned work and the next timer until both queues
    /// are empty. Returns how many jobs ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            ran += self.run_spawned();
            let next = {
                let inner = self.inner.lock();
                inner
                    .timers
                    .peek()
                    .map(|timer| timer.deadline.saturating_sub(inner.now))
            };
            match next {
                Some(wait) => ran += self.advance(wait),
                None => return ran,
            }
        }
    }
}

impl Executor for ManualExecutor {
    fn spawn(&self, job: Job) {
        self.inner.lock().spawned.push_back(job);
    }

    fn after(&self, delay: Duration, job: Job) {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let timer = Scheduled {
            deadline: inner.now + delay,
            seq: inner.seq,
            job,
        };
        trace!("manual timer #{} due at {:?}", timer.seq, timer.deadline);
        inner.timers.push(timer);
    }
}

#[cfg(test)]
mod tests {
    use super::ManualExecutor;
    use crate::executor::Executor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_advance_only_runs_due_timers() {
        let executor = ManualExecutor::new();
        let log = Arc::new(Mutex::new(vec![]));
        for (ms, label) in [(20, "b"), (10, "a"), (30, "c")] {
            let log = log.clone();
            executor.after(
                Duration::from_millis(ms),
                Box::new(move || log.lock().unwrap().push(label)),
            );
        }
        assert_eq!(executor.advance(Duration::from_millis(20)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(executor.now(), Duration::from_millis(20));
        assert_eq!(executor.pending_timers(), 1);
    }

    #[test]
    fn test_timers_scheduled_inside_window_run() {
        let executor = Arc::new(ManualExecutor::new());
        let hits = Arc::new(Mutex::new(0));
        let (inner_executor, inner_hits) = (executor.clone(), hits.clone());
        executor.after(
            Duration::from_millis(5),
            Box::new(move || {
                inner_executor.after(
                    Duration::from_millis(5),
                    Box::new(move || *inner_hits.lock().unwrap() += 1),
                );
            }),
        );
        assert_eq!(executor.advance(Duration::from_millis(10)), 2);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_spawned_work_waits_for_run_spawned() {
        let executor = ManualExecutor::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        executor.spawn(Box::new(move || *counter.lock().unwrap() += 1));
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(executor.pending_spawned(), 1);
        assert_eq!(executor.run_spawned(), 1);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_run_until_idle_drains_everything() {
        let executor = Arc::new(ManualExecutor::new());
        let relay = executor.clone();
        executor.spawn(Box::new(move || {
            relay.after(Duration::from_secs(3), Box::new(|| {}));
        }));
        assert_eq!(executor.run_until_idle(), 2);
        assert_eq!(executor.now(), Duration::from_secs(3));
    }
}
