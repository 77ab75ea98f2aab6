use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::executor::Executor;
use crate::fallback::report_uncaught;
use crate::{PledgeConfig, PledgeError};

type OnResolve<T> = Box<dyn FnOnce(&T) + Send>;
type OnReject = Box<dyn FnOnce(PledgeError) + Send>;

/// A single-assignment value that is eventually resolved or rejected.
///
/// `Pledge` is the consumer side: clone it freely and attach continuations
/// with [`then`](Pledge::then) and [`fail`](Pledge::fail). Settling happens
/// through the [`Settler`] handed out at construction.
///
/// # Examples
///
/// ```
/// use pledges::Pledge;
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(None));
/// let sink = seen.clone();
/// Pledge::new(|settler| settler.resolve("🍓".to_string()))
///     .then(move |value| *sink.lock().unwrap() = Some(value.clone()));
/// assert_eq!(seen.lock().unwrap().as_deref(), Some("🍓"));
/// ```
pub struct Pledge<T> {
    shared: Arc<Shared<T>>,
}

/// The producer side of a [`Pledge`]. The first `resolve` or `reject` wins;
/// everything after is ignored.
pub struct Settler<T> {
    shared: Arc<Shared<T>>,
    relay: Option<Arc<dyn Executor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeState {
    Pending,
    Resolved,
    Rejected,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    config: PledgeConfig,
}

struct State<T> {
    outcome: Outcome<T>,
    on_resolve: VecDeque<OnResolve<T>>,
    on_reject: VecDeque<OnReject>,
    wakers: Vec<Waker>,
    // A failure continuation or an awaiter has seen the rejection.
    handled: bool,
    // The settling thread is still running queued continuations; late ones
    // join the back of the queue.
    draining: bool,
}

enum Outcome<T> {
    Pending,
    Resolved(Arc<T>),
    Rejected(PledgeError),
}

impl<T> Shared<T> {
    fn new(config: PledgeConfig) -> Self {
        Self {
            state: Mutex::new(State {
                outcome: Outcome::Pending,
                on_resolve: VecDeque::new(),
                on_reject: VecDeque::new(),
                wakers: Vec::new(),
                handled: false,
                draining: false,
            }),
            config,
        }
    }

    fn snapshot(&self) -> PledgeState {
        match self.state.lock().outcome {
            Outcome::Pending => PledgeState::Pending,
            Outcome::Resolved(_) => PledgeState::Resolved,
            Outcome::Rejected(_) => PledgeState::Rejected,
        }
    }
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn resolve(&self, value: T) {
        let (value, wakers) = {
            let mut state = self.state.lock();
            if !matches!(state.outcome, Outcome::Pending) {
                trace!("ignoring resolve on a settled pledge");
                return;
            }
            let value = Arc::new(value);
            state.outcome = Outcome::Resolved(value.clone());
            state.on_reject.clear();
            state.draining = true;
            trace!("pledge resolved, {} continuation(s) queued", state.on_resolve.len());
            (value, mem::take(&mut state.wakers))
        };
        let _guard = self.drain_guard();
        while let Some(then) = self.next_in_queue(|state| state.on_resolve.pop_front()) {
            then(&value);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn reject(self: &Arc<Self>, error: PledgeError) {
        let (wakers, unobserved) = {
            let mut state = self.state.lock();
            if !matches!(state.outcome, Outcome::Pending) {
                trace!("ignoring reject on a settled pledge: {error}");
                return;
            }
            state.outcome = Outcome::Rejected(error.clone());
            state.on_resolve.clear();
            state.draining = true;
            let unobserved = state.on_reject.is_empty() && state.wakers.is_empty();
            state.handled = !unobserved;
            (mem::take(&mut state.wakers), unobserved)
        };
        trace!("pledge rejected: {error}");
        if unobserved {
            self.arm_fallback(error.clone());
        }
        let _guard = self.drain_guard();
        while let Some(fail) = self.next_in_queue(|state| state.on_reject.pop_front()) {
            fail(error.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn drain_guard(&self) -> DrainGuard<'_, T> {
        DrainGuard(self)
    }

    /// Pops the next queued continuation, or ends the drain once the queue
    /// is empty. Continuations always run with the lock released.
    fn next_in_queue<C>(&self, pop: impl FnOnce(&mut State<T>) -> Option<C>) -> Option<C> {
        let mut state = self.state.lock();
        let next = pop(&mut *state);
        if next.is_none() {
            state.draining = false;
        }
        next
    }

    fn arm_fallback(self: &Arc<Self>, error: PledgeError) {
        let shared = self.clone();
        self.config.executor_handle().after(
            self.config.grace_period(),
            Box::new(move || {
                if !shared.state.lock().handled {
                    report_uncaught(&shared.config, &error);
                }
            }),
        );
    }

    fn arm_timeout(self: &Arc<Self>) {
        let timeout = self.config.timeout_duration();
        let shared = self.clone();
        self.config.executor_handle().after(
            timeout,
            Box::new(move || {
                if matches!(shared.state.lock().outcome, Outcome::Pending) {
                    debug!("pledge timed out after {timeout:?}");
                    shared.reject(PledgeError::timeout(timeout));
                }
            }),
        );
    }
}

// A continuation that panics must not leave the pledge stuck queueing.
struct DrainGuard<'a, T>(&'a Shared<T>);

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.state.lock().draining = false;
        }
    }
}

impl<T: Send + Sync + 'static> Pledge<T> {
    /// Runs `action` right away with the pledge's settler, using the default
    /// [`PledgeConfig`].
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce(Settler<T>),
    {
        Self::with_config(&PledgeConfig::default(), action)
    }

    pub fn with_timeout<F>(timeout: Duration, action: F) -> Self
    where
        F: FnOnce(Settler<T>),
    {
        Self::with_config(&PledgeConfig::default().timeout(timeout), action)
    }

    /// Runs `action` synchronously, then arms the timeout: a pledge still
    /// pending when it elapses is rejected with a [`PledgeError::TIMEOUT`]
    /// error.
    pub fn with_config<F>(config: &PledgeConfig, action: F) -> Self
    where
        F: FnOnce(Settler<T>),
    {
        let shared = Arc::new(Shared::new(config.clone()));
        action(Settler {
            shared: shared.clone(),
            relay: None,
        });
        shared.arm_timeout();
        Self { shared }
    }

    /// A pledge with no action, together with the only means to settle it.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledges::{Pledge, PledgeConfig};
    /// use futures::executor::block_on;
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let config = PledgeConfig::new().timeout(Duration::from_secs(5));
    /// let (pledge, settler) = Pledge::<String>::pending_with(&config);
    /// let task = thread::spawn(move || block_on(pledge));
    /// settler.resolve("Hi".into());
    /// assert_eq!(task.join().unwrap(), Ok("Hi".to_string()));
    /// ```
    pub fn pending() -> (Self, Settler<T>) {
        Self::pending_with(&PledgeConfig::default())
    }

    pub fn pending_with(config: &PledgeConfig) -> (Self, Settler<T>) {
        let pledge = Self::with_config(config, |_| {});
        let settler = Settler {
            shared: pledge.shared.clone(),
            relay: None,
        };
        (pledge, settler)
    }

    pub fn resolved(value: T) -> Self {
        Self::resolved_with(&PledgeConfig::default(), value)
    }

    pub fn resolved_with(config: &PledgeConfig, value: T) -> Self {
        Self::with_config(config, |settler| settler.resolve(value))
    }

    pub fn rejected(error: PledgeError) -> Self {
        Self::rejected_with(&PledgeConfig::default(), error)
    }

    pub fn rejected_with(config: &PledgeConfig, error: PledgeError) -> Self {
        Self::with_config(config, |settler| settler.reject(error))
    }

    /// Resolves with the value when present, rejects with a
    /// [`PledgeError::NIL_VALUE`] error otherwise.
    pub fn from_option(value: Option<T>) -> Self {
        Self::from_option_or(value, PledgeError::nil_value())
    }

    pub fn from_option_or(value: Option<T>, error: PledgeError) -> Self {
        Self::new(|settler| match value {
            Some(value) => settler.resolve(value),
            None => settler.reject(error),
        })
    }

    /// Calls `then` with the value: immediately if already resolved,
    /// otherwise once the pledge resolves. Never called on rejection.
    pub fn then<F>(&self, then: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let value = {
            let mut state = self.shared.state.lock();
            match &state.outcome {
                Outcome::Pending => {
                    state.on_resolve.push_back(Box::new(then));
                    return self.clone();
                }
                Outcome::Rejected(_) => return self.clone(),
                Outcome::Resolved(_) if state.draining => {
                    state.on_resolve.push_back(Box::new(then));
                    return self.clone();
                }
                Outcome::Resolved(value) => value.clone(),
            }
        };
        then(&value);
        self.clone()
    }

    /// Calls `fail` with the error: immediately if already rejected,
    /// otherwise once the pledge rejects. Never called on resolution.
    /// Attaching to a rejected pledge counts as handling the rejection.
    pub fn fail<F>(&self, fail: F) -> Self
    where
        F: FnOnce(PledgeError) + Send + 'static,
    {
        let error = {
            let mut state = self.shared.state.lock();
            match &state.outcome {
                Outcome::Pending => {
                    state.on_reject.push_back(Box::new(fail));
                    return self.clone();
                }
                Outcome::Resolved(_) => return self.clone(),
                Outcome::Rejected(_) if state.draining => {
                    state.handled = true;
                    state.on_reject.push_back(Box::new(fail));
                    return self.clone();
                }
                Outcome::Rejected(error) => {
                    let error = error.clone();
                    state.handled = true;
                    error
                }
            }
        };
        fail(error);
        self.clone()
    }

    pub fn state(&self) -> PledgeState {
        self.shared.snapshot()
    }

    pub fn config(&self) -> &PledgeConfig {
        &self.shared.config
    }
}

impl<T> Clone for Pledge<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Pledge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pledge")
            .field("state", &self.shared.snapshot())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Settler<T> {
    pub fn resolve(&self, value: T) {
        match &self.relay {
            Some(executor) => {
                let shared = self.shared.clone();
                executor.dispatch(Box::new(move || shared.resolve(value)));
            }
            None => self.shared.resolve(value),
        }
    }

    pub fn reject(&self, error: PledgeError) {
        match &self.relay {
            Some(executor) => {
                let shared = self.shared.clone();
                executor.dispatch(Box::new(move || shared.reject(error)));
            }
            None => self.shared.reject(error),
        }
    }

    /// A settler whose calls hop onto `executor`'s serial context before
    /// touching the pledge.
    pub fn relayed_through(&self, executor: Arc<dyn Executor>) -> Settler<T> {
        Settler {
            shared: self.shared.clone(),
            relay: Some(executor),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.shared.snapshot() != PledgeState::Pending
    }
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            relay: self.relay.clone(),
        }
    }
}

impl<T> fmt::Debug for Settler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("relayed", &self.relay.is_some())
            .finish()
    }
}

/// Awaiting a pledge yields a clone of its value, or its error. An awaiter
/// counts as observing the rejection.
impl<T: Clone> Future for Pledge<T> {
    type Output = Result<T, PledgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();
        match &state.outcome {
            Outcome::Resolved(value) => Poll::Ready(Ok(T::clone(value))),
            Outcome::Rejected(error) => {
                let error = error.clone();
                state.handled = true;
                Poll::Ready(Err(error))
            }
            Outcome::Pending => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
