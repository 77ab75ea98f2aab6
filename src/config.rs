use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{default_executor, Executor};
use crate::fallback::FallbackHandler;

/// How long a pledge may stay pending when nobody says otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

/// Everything a pledge needs from its surroundings.
///
/// Derived pledges (`map`, `flat_map`, `all`, ...) inherit the config of
/// the pledge they were derived from.
///
/// # Examples
///
/// ```
/// use pledges::PledgeConfig;
/// use std::time::Duration;
///
/// let config = PledgeConfig::new().timeout(Duration::from_secs(2));
/// assert_eq!(config.grace_period(), Duration::from_secs(2));
///
/// let config = config.grace(Duration::from_millis(50));
/// assert_eq!(config.grace_period(), Duration::from_millis(50));
/// ```
#[derive(Clone)]
pub struct PledgeConfig {
    timeout: Duration,
    grace: Option<Duration>,
    executor: Arc<dyn Executor>,
    fallback: Option<FallbackHandler>,
}

impl PledgeConfig {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            grace: None,
            executor: default_executor(),
            fallback: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the unhandled-rejection grace window. Without it the window is
    /// the timeout.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Routes this config's uncaught rejections to `handler` instead of the
    /// process-wide one.
    pub fn fallback(mut self, handler: FallbackHandler) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn grace_period(&self) -> Duration {
        self.grace.unwrap_or(self.timeout)
    }

    pub fn executor_handle(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub(crate) fn fallback_override(&self) -> Option<&FallbackHandler> {
        self.fallback.as_ref()
    }
}

impl Default for PledgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PledgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PledgeConfig")
            .field("timeout", &self.timeout)
            .field("grace", &self.grace_period())
            .field("fallback", &self.fallback.as_ref().map(|_| "custom"))
            .finish_non_exhaustive()
    }
}
