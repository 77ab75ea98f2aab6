use crate::{Pledge, PledgeConfig, Settler};

/// Runs `work` through the executor's `spawn` and hands it a settler whose
/// calls are relayed back onto the serial context, so the pledge only ever
/// changes state there.
///
/// # Examples
///
/// ```
/// use pledges::{run_in_background_with, PledgeConfig};
/// use futures::executor::block_on;
/// use std::time::Duration;
///
/// let config = PledgeConfig::new().timeout(Duration::from_secs(5));
/// let answer = run_in_background_with(&config, |settler| settler.resolve(6 * 7));
/// assert_eq!(block_on(answer), Ok(42));
/// ```
pub fn run_in_background<T, F>(work: F) -> Pledge<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Settler<T>) + Send + 'static,
{
    run_in_background_with(&PledgeConfig::default(), work)
}

pub fn run_in_background_with<T, F>(config: &PledgeConfig, work: F) -> Pledge<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Settler<T>) + Send + 'static,
{
    let executor = config.executor_handle().clone();
    Pledge::with_config(config, move |settler| {
        let relayed = settler.relayed_through(executor.clone());
        executor.spawn(Box::new(move || work(relayed)));
    })
}

#[cfg(test)]
mod tests {
    use super::run_in_background_with;
    use crate::manual::ManualExecutor;
    use crate::{PledgeConfig, PledgeError, PledgeState};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_settles_only_on_serial_context() {
        let executor = Arc::new(ManualExecutor::new());
        let config = PledgeConfig::new()
            .executor(executor.clone())
            .timeout(Duration::from_secs(1));
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let pledge = run_in_background_with(&config, move |settler| {
            *flag.lock().unwrap() = true;
            settler.resolve("Amazing answer from another wooooorld!");
        });
        assert!(!*ran.lock().unwrap());

        assert_eq!(executor.run_spawned(), 1);
        assert!(*ran.lock().unwrap());
        assert_eq!(pledge.state(), PledgeState::Pending);

        executor.advance(Duration::ZERO);
        assert_eq!(pledge.state(), PledgeState::Resolved);
    }

    #[test]
    fn test_rejection_is_relayed() {
        let executor = Arc::new(ManualExecutor::new());
        let config = PledgeConfig::new()
            .executor(executor.clone())
            .timeout(Duration::from_secs(1));
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        run_in_background_with::<String, _>(&config, |settler| {
            settler.reject(PledgeError::new("Amazing answer from another wooooorld!", 10))
        })
        .fail(move |e| *sink.lock().unwrap() = Some(e.code()));
        executor.run_until_idle();
        assert_eq!(*seen.lock().unwrap(), Some(10));
    }
}
