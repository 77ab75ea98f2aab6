//! The scheduling port pledges run on.
//!
//! A pledge needs exactly two things from its environment: a way to run work
//! somewhere other than the calling context, and a way to run a callback
//! after a delay on one designated serial context. [`Executor`] is that
//! contract. [`ThreadExecutor`] is the process default; tests usually reach
//! for [`ManualExecutor`](crate::manual::ManualExecutor) instead.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{self, AtomicU64};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, trace};
use parking_lot::Mutex;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Runs `job` off the calling execution context.
    fn spawn(&self, job: Job);

    /// Runs `job` on the serial context once `delay` has elapsed.
    fn after(&self, delay: Duration, job: Job);

    /// Runs `job` on the serial context as soon as possible.
    fn dispatch(&self, job: Job) {
        self.after(Duration::ZERO, job)
    }
}

static DEFAULT_EXECUTOR: LazyLock<Arc<dyn Executor>> =
    LazyLock::new(|| Arc::new(ThreadExecutor::new()));

/// The process-wide [`ThreadExecutor`] used by [`PledgeConfig::default`](crate::PledgeConfig).
pub fn default_executor() -> Arc<dyn Executor> {
    DEFAULT_EXECUTOR.clone()
}

/// A job waiting for its deadline. Ordered so that a `BinaryHeap` pops the
/// earliest deadline first, ties broken by submission order.
pub(crate) struct Scheduled<D> {
    pub(crate) deadline: D,
    pub(crate) seq: u64,
    pub(crate) job: Job,
}

impl<D: Ord> PartialEq for Scheduled<D> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<D: Ord> Eq for Scheduled<D> {}

impl<D: Ord> PartialOrd for Scheduled<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D: Ord> Ord for Scheduled<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Runs a job, keeping a panicking continuation from taking the calling
/// context down with it.
pub(crate) fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("pledge job panicked");
    }
}

/// Threads for `spawn`, one long-lived worker thread as the serial context.
///
/// The worker keeps a timer heap fed through a channel. Dropping the
/// executor closes the channel; timers already queued still run at their
/// deadlines before the worker exits.
///
/// # Examples
///
/// ```
/// use pledges::executor::{Executor, ThreadExecutor};
/// use std::sync::mpsc::channel;
/// use std::time::Duration;
///
/// let executor = ThreadExecutor::new();
/// let (tx, rx) = channel();
/// executor.after(Duration::from_millis(5), Box::new(move || tx.send("late").unwrap()));
/// assert_eq!(rx.recv().unwrap(), "late");
/// ```
#[derive(Debug)]
pub struct ThreadExecutor {
    timers: Mutex<Sender<Scheduled<Instant>>>,
    seq: AtomicU64,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        thread::spawn(move || serial_loop(rx));
        Self {
            timers: Mutex::new(tx),
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadExecutor {
    fn spawn(&self, job: Job) {
        thread::spawn(move || run_job(job));
    }

    fn after(&self, delay: Duration, job: Job) {
        let seq = self.seq.fetch_add(1, atomic::Ordering::Relaxed) + 1;
        let timer = Scheduled {
            deadline: Instant::now() + delay,
            seq,
            job,
        };
        if self.timers.lock().send(timer).is_err() {
            error!("serial context is gone, dropping timer #{seq}");
        }
    }
}

fn serial_loop(rx: Receiver<Scheduled<Instant>>) {
    let mut timers: BinaryHeap<Scheduled<Instant>> = BinaryHeap::new();
    let mut open = true;
    loop {
        while timers
            .peek()
            .is_some_and(|timer| timer.deadline <= Instant::now())
        {
            if let Some(timer) = timers.pop() {
                trace!("serial context running timer #{}", timer.seq);
                run_job(timer.job);
            }
        }
        let next = timers.peek().map(|timer| timer.deadline);
        match (next, open) {
            (None, false) => return,
            (Some(deadline), false) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
            }
            (None, true) => match rx.recv() {
                Ok(timer) => timers.push(timer),
                Err(_) => open = false,
            },
            (Some(deadline), true) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(timer) => timers.push(timer),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => open = false,
                }
            }
        }
    }
}
