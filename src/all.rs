use std::mem;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::{AnyValue, Pledge, PledgeConfig, PledgeError, Promise, Settler};

/// Formats the index part of a wrapped `all` error from the failing slot and
/// its message.
pub type ErrorDescriber = Arc<dyn Fn(usize, &str) -> String + Send + Sync>;

/// How [`all_with`] reports failures.
///
/// The message of a wrapped error is `error_wrapper + describe(index,
/// message)`. With an empty wrapper errors pass through unchanged.
#[derive(Clone)]
pub struct AllOptions {
    fail_fast: bool,
    error_wrapper: String,
    describe: ErrorDescriber,
}

impl AllOptions {
    pub fn new() -> Self {
        Self {
            fail_fast: false,
            error_wrapper: "Array error".to_owned(),
            describe: Arc::new(|index: usize, message: &str| format!(" [{index}] <{message}>")),
        }
    }

    /// Options that hand errors through without index context.
    pub fn unwrapped() -> Self {
        Self::new().error_wrapper("")
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn error_wrapper(mut self, wrapper: impl Into<String>) -> Self {
        self.error_wrapper = wrapper.into();
        self
    }

    pub fn describe_with(mut self, describe: ErrorDescriber) -> Self {
        self.describe = describe;
        self
    }

    fn wrap(&self, index: usize, error: PledgeError) -> PledgeError {
        let description = format!(
            "{}{}",
            self.error_wrapper,
            (self.describe)(index, error.message())
        );
        if self.error_wrapper.is_empty() || description == error.message() {
            error
        } else {
            error.rewrite(description)
        }
    }
}

impl Default for AllOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins `pledges` into one pledge of their values, in input order.
///
/// In cumulative mode (`fail_fast == false`) the result waits for every
/// input; a single failure is reported as is, several are folded into one
/// [`PledgeError::AGGREGATE`] error listing each message. In fail-fast mode
/// the first failure rejects the result immediately.
///
/// # Examples
///
/// ```
/// use pledges::{all, Pledge};
/// use futures::executor::block_on;
///
/// let joined = all(vec![Pledge::resolved(1), Pledge::resolved(2)], false);
/// assert_eq!(block_on(joined), Ok(vec![1, 2]));
/// ```
pub fn all<T, I>(pledges: I, fail_fast: bool) -> Pledge<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Pledge<T>>,
{
    all_with(pledges, AllOptions::new().fail_fast(fail_fast))
}

pub fn all_with<T, I>(pledges: I, options: AllOptions) -> Pledge<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Pledge<T>>,
{
    let pledges: Vec<Pledge<T>> = pledges.into_iter().collect();
    let Some(first) = pledges.first() else {
        return Pledge::resolved(Vec::new());
    };
    let config = first.config().clone();
    connect(&config, pledges, options)
}

/// [`all`] over anything implementing [`Promise`], values type-erased.
/// Errors pass through without index context.
pub fn all_promises(promises: &[&dyn Promise], fail_fast: bool) -> Pledge<Vec<AnyValue>> {
    let Some(first) = promises.first() else {
        return Pledge::resolved(Vec::new());
    };
    let config = first.config();
    let pledges: Vec<Pledge<AnyValue>> = promises
        .iter()
        .map(|promise| {
            Pledge::with_config(&config, |settler: Settler<AnyValue>| {
                let on_fail = settler.clone();
                promise.when_resolved(Box::new(move |value| settler.resolve(value)));
                promise.when_rejected(Box::new(move |error| on_fail.reject(error)));
            })
        })
        .collect();
    connect(
        &config,
        pledges,
        AllOptions::unwrapped().fail_fast(fail_fast),
    )
}

struct Slots<T> {
    results: Vec<Option<T>>,
    errors: Vec<Option<PledgeError>>,
    resolved: usize,
    failed: usize,
}

enum Verdict<T> {
    Wait,
    Resolve(Vec<T>),
    Reject(PledgeError),
}

impl<T> Slots<T> {
    fn new(count: usize) -> Self {
        Self {
            results: (0..count).map(|_| None).collect(),
            errors: (0..count).map(|_| None).collect(),
            resolved: 0,
            failed: 0,
        }
    }

    fn verdict(&mut self) -> Verdict<T> {
        let total = self.results.len();
        if self.resolved == total {
            return Verdict::Resolve(mem::take(&mut self.results).into_iter().flatten().collect());
        }
        if self.failed == 0 || self.resolved + self.failed < total {
            return Verdict::Wait;
        }
        let mut errors: Vec<PledgeError> =
            mem::take(&mut self.errors).into_iter().flatten().collect();
        debug!("all settled with {} failure(s)", errors.len());
        match errors.len() {
            1 => Verdict::Reject(errors.remove(0)),
            _ => Verdict::Reject(PledgeError::aggregate(errors)),
        }
    }
}

fn connect<T>(config: &PledgeConfig, pledges: Vec<Pledge<T>>, options: AllOptions) -> Pledge<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    Pledge::with_config(config, move |settler: Settler<Vec<T>>| {
        let slots = Arc::new(Mutex::new(Slots::new(pledges.len())));
        for (index, pledge) in pledges.iter().enumerate() {
            let (on_value, on_error) = (slots.clone(), slots.clone());
            let (resolver, rejecter) = (settler.clone(), settler.clone());
            let options = options.clone();
            pledge
                .then(move |value| {
                    let verdict = {
                        let mut slots = on_value.lock();
                        slots.results[index] = Some(value.clone());
                        slots.resolved += 1;
                        slots.verdict()
                    };
                    settle(&resolver, verdict);
                })
                .fail(move |error| {
                    let error = options.wrap(index, error);
                    if options.fail_fast {
                        debug!("all failing fast on input {index}");
                        rejecter.reject(error);
                        return;
                    }
                    let verdict = {
                        let mut slots = on_error.lock();
                        slots.errors[index] = Some(error);
                        slots.failed += 1;
                        slots.verdict()
                    };
                    settle(&rejecter, verdict);
                });
        }
    })
}

fn settle<T: Send + Sync + 'static>(settler: &Settler<Vec<T>>, verdict: Verdict<T>) {
    match verdict {
        Verdict::Wait => {}
        Verdict::Resolve(values) => settler.resolve(values),
        Verdict::Reject(error) => settler.reject(error),
    }
}

#[cfg(test)]
mod tests {
    use super::{all, all_with, AllOptions};
    use crate::manual::ManualExecutor;
    use crate::{Pledge, PledgeConfig, PledgeError};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config() -> PledgeConfig {
        PledgeConfig::new()
            .executor(Arc::new(ManualExecutor::new()))
            .timeout(Duration::from_secs(1))
    }

    #[test]
    fn test_empty_resolves_immediately() {
        let values = Arc::new(Mutex::new(None));
        let sink = values.clone();
        all(Vec::<Pledge<String>>::new(), false)
            .then(move |v| *sink.lock().unwrap() = Some(v.len()))
            .fail(|e| panic!("unexpected {e}"));
        assert_eq!(*values.lock().unwrap(), Some(0));
    }

    #[test]
    fn test_single_input_follows_it() {
        let config = config();
        let (pledge, settler) = Pledge::<u8>::pending_with(&config);
        let joined = all(vec![pledge], false);
        let values = Arc::new(Mutex::new(None));
        let sink = values.clone();
        joined.then(move |v| *sink.lock().unwrap() = Some(v.clone()));
        settler.resolve(9);
        assert_eq!(*values.lock().unwrap(), Some(vec![9]));
    }

    #[test]
    fn test_fail_fast_wraps_with_index() {
        let config = config();
        let (a, _a) = Pledge::<u8>::pending_with(&config);
        let (b, b_settler) = Pledge::<u8>::pending_with(&config);
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        all(vec![a, b], true).fail(move |e| sink.lock().unwrap().push(e));
        b_settler.reject(PledgeError::new("boom", 5));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message(), "Array error [1] <boom>");
        assert_eq!(seen[0].code(), 5);
        assert_eq!(seen[0].cause().map(|c| c.message()), Some("boom"));
    }

    #[test]
    fn test_single_failure_among_successes_is_reported_alone() {
        let config = config();
        let (a, a_settler) = Pledge::<u8>::pending_with(&config);
        let (b, b_settler) = Pledge::<u8>::pending_with(&config);
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        all_with(vec![a, b], AllOptions::unwrapped())
            .fail(move |e| sink.lock().unwrap().push(e));
        a_settler.reject("only one".into());
        assert!(seen.lock().unwrap().is_empty());
        b_settler.resolve(1);
        assert_eq!(*seen.lock().unwrap(), vec![PledgeError::msg("only one")]);
    }

    #[test]
    fn test_custom_describer() {
        let config = config();
        let (a, a_settler) = Pledge::<u8>::pending_with(&config);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let options = AllOptions::new()
            .error_wrapper("loading")
            .describe_with(Arc::new(|index: usize, message: &str| {
                format!(" #{index}: {message}")
            }));
        all_with(vec![a], options).fail(move |e| *sink.lock().unwrap() = Some(e));
        a_settler.reject("timeout".into());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_ref().map(|e| e.message()), Some("loading #0: timeout"));
    }
}
