//! Transforming one pledge into another.
//!
//! Every combinator here returns a fresh pledge that inherits the source's
//! config. The `_with` variants take an error context: when it is non-empty
//! a rejection is re-raised as `context + message` with the upstream error kept as
//! its cause; when empty the upstream error passes through.
use crate::{Pledge, PledgeError, Settler};

impl<T: Send + Sync + 'static> Pledge<T> {
    /// Resolves with `transform(value)` once this pledge resolves.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledges::Pledge;
    /// use futures::executor::block_on;
    ///
    /// let length = Pledge::resolved("plops".to_string()).map(|s| s.len());
    /// assert_eq!(block_on(length), Ok(5));
    /// ```
    pub fn map<K, F>(&self, transform: F) -> Pledge<K>
    where
        K: Send + Sync + 'static,
        F: FnOnce(&T) -> K + Send + 'static,
    {
        self.map_with("", transform)
    }

    pub fn map_with<K, F>(&self, context: &str, transform: F) -> Pledge<K>
    where
        K: Send + Sync + 'static,
        F: FnOnce(&T) -> K + Send + 'static,
    {
        let source = self.clone();
        let context = context.to_owned();
        Pledge::with_config(self.config(), move |settler: Settler<K>| {
            let on_fail = settler.clone();
            source
                .then(move |value| settler.resolve(transform(value)))
                .fail(move |error| on_fail.reject(error.wrap(&context)));
        })
    }

    /// Follows the pledge returned by `transform`.
    pub fn flat_map<K, F>(&self, transform: F) -> Pledge<K>
    where
        K: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> Pledge<K> + Send + 'static,
    {
        self.flat_map_with("", transform)
    }

    /// Like [`flat_map`](Self::flat_map); `context` wraps both this pledge's
    /// rejection and the inner pledge's.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledges::{Pledge, PledgeError};
    /// use futures::executor::block_on;
    ///
    /// let user = Pledge::resolved(7u32).flat_map_with("loading user: ", |id| {
    ///     Pledge::<String>::rejected(PledgeError::new(format!("no user {id}"), 404))
    /// });
    /// let error = block_on(user).unwrap_err();
    /// assert_eq!(error.message(), "loading user: no user 7");
    /// assert_eq!(error.code(), 404);
    /// ```
    pub fn flat_map_with<K, F>(&self, context: &str, transform: F) -> Pledge<K>
    where
        K: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> Pledge<K> + Send + 'static,
    {
        let source = self.clone();
        let outer_context = context.to_owned();
        let inner_context = context.to_owned();
        Pledge::with_config(self.config(), move |settler: Settler<K>| {
            let on_fail = settler.clone();
            source
                .then(move |value| {
                    let on_inner_fail = settler.clone();
                    transform(value)
                        .then(move |inner| settler.resolve(inner.clone()))
                        .fail(move |error| on_inner_fail.reject(error.wrap(&inner_context)));
                })
                .fail(move |error| on_fail.reject(error.wrap(&outer_context)));
        })
    }

    /// Callback-style [`flat_map`](Self::flat_map): `transform` gets the
    /// value and the new pledge's settler, for producers that report through
    /// callbacks.
    pub fn flat_map_settle<K, F>(&self, transform: F) -> Pledge<K>
    where
        K: Send + Sync + 'static,
        F: FnOnce(&T, Settler<K>) + Send + 'static,
    {
        self.flat_map_settle_with("", transform)
    }

    pub fn flat_map_settle_with<K, F>(&self, context: &str, transform: F) -> Pledge<K>
    where
        K: Send + Sync + 'static,
        F: FnOnce(&T, Settler<K>) + Send + 'static,
    {
        let source = self.clone();
        let context = context.to_owned();
        Pledge::with_config(self.config(), move |settler: Settler<K>| {
            let on_fail = settler.clone();
            source
                .then(move |value| transform(value, settler))
                .fail(move |error: PledgeError| on_fail.reject(error.wrap(&context)));
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::manual::ManualExecutor;
    use crate::{Pledge, PledgeConfig, PledgeError, PledgeState, Settler};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config() -> (Arc<ManualExecutor>, PledgeConfig) {
        let executor = Arc::new(ManualExecutor::new());
        let config = PledgeConfig::new()
            .executor(executor.clone())
            .timeout(Duration::from_secs(1));
        (executor, config)
    }

    fn record<T: Clone + Send + Sync + 'static>(
        pledge: &Pledge<T>,
    ) -> Arc<Mutex<Option<Result<T, PledgeError>>>> {
        let slot = Arc::new(Mutex::new(None));
        let (ok, err) = (slot.clone(), slot.clone());
        pledge
            .then(move |v| *ok.lock().unwrap() = Some(Ok(v.clone())))
            .fail(move |e| *err.lock().unwrap() = Some(Err(e)));
        slot
    }

    #[test]
    fn test_map_waits_for_source() {
        let (_executor, config) = config();
        let (source, settler) = Pledge::<i32>::pending_with(&config);
        let doubled = source.map(|v| v * 2);
        let slot = record(&doubled);
        assert!(slot.lock().unwrap().is_none());
        settler.resolve(21);
        assert_eq!(*slot.lock().unwrap(), Some(Ok(42)));
    }

    #[test]
    fn test_map_passes_error_through_without_context() {
        let (_executor, config) = config();
        let upstream = PledgeError::new("boom", 3);
        let mapped = Pledge::<i32>::rejected_with(&config, upstream.clone()).map(|v| v + 1);
        assert_eq!(*record(&mapped).lock().unwrap(), Some(Err(upstream)));
    }

    #[test]
    fn test_map_with_wraps_error() {
        let (_executor, config) = config();
        let upstream = PledgeError::new("boom", 3);
        let mapped =
            Pledge::<i32>::rejected_with(&config, upstream.clone()).map_with("parsing: ", |v| v + 1);
        let error = record(&mapped).lock().unwrap().clone().unwrap().unwrap_err();
        assert_eq!(error.message(), "parsing: boom");
        assert_eq!(error.code(), 3);
        assert_eq!(error.cause(), Some(&upstream));
    }

    #[test]
    fn test_map_inherits_config() {
        let (executor, config) = config();
        let (source, _settler) = Pledge::<i32>::pending_with(&config);
        let mapped = source.map(|v| *v);
        assert_eq!(mapped.config().timeout_duration(), Duration::from_secs(1));
        executor.advance(Duration::from_secs(1));
        assert_eq!(mapped.state(), PledgeState::Rejected);
    }

    #[test]
    fn test_flat_map_follows_inner_pledge() {
        let (_executor, config) = config();
        let (inner, inner_settler) = Pledge::<String>::pending_with(&config);
        let outer = Pledge::resolved_with(&config, 5).flat_map(move |_| inner.clone());
        let slot = record(&outer);
        assert!(slot.lock().unwrap().is_none());
        inner_settler.resolve("five".into());
        assert_eq!(*slot.lock().unwrap(), Some(Ok("five".to_string())));
    }

    #[test]
    fn test_flat_map_with_wraps_outer_rejection() {
        let (_executor, config) = config();
        let outer = Pledge::<i32>::rejected_with(&config, "outer".into())
            .flat_map_with("ctx ", |v| Pledge::resolved(*v));
        let error = record(&outer).lock().unwrap().clone().unwrap().unwrap_err();
        assert_eq!(error.message(), "ctx outer");
    }

    #[test]
    fn test_flat_map_settle_hands_over_settler() {
        let (_executor, config) = config();
        let parked = Arc::new(Mutex::new(None));
        let park = parked.clone();
        let outer = Pledge::resolved_with(&config, 2).flat_map_settle(move |v: &i32, settler: Settler<i32>| {
            *park.lock().unwrap() = Some((*v, settler));
        });
        let slot = record(&outer);
        let (value, settler) = parked.lock().unwrap().take().unwrap();
        settler.resolve(value * 10);
        assert_eq!(*slot.lock().unwrap(), Some(Ok(20)));
    }

    #[test]
    fn test_flat_map_settle_with_wraps_source_rejection() {
        let (_executor, config) = config();
        let outer = Pledge::<i32>::rejected_with(&config, "down".into())
            .flat_map_settle_with("callback: ", |_, settler: Settler<i32>| {
                settler.resolve(1)
            });
        let error = record(&outer).lock().unwrap().clone().unwrap().unwrap_err();
        assert_eq!(error.message(), "callback: down");
    }
}
