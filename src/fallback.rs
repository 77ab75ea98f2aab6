//! Where rejections nobody listened to end up.
//!
//! The process holds one handler. It starts out logging through
//! `log::error!`; tests swap it with [`override_fallback_handler`] and get the
//! previous one back when the guard drops.
use std::sync::{Arc, LazyLock};

use log::error;
use parking_lot::RwLock;

use crate::{PledgeConfig, PledgeError};

pub type FallbackHandler = Arc<dyn Fn(&PledgeError) + Send + Sync>;

static FALLBACK: LazyLock<RwLock<FallbackHandler>> =
    LazyLock::new(|| RwLock::new(log_handler()));

fn log_handler() -> FallbackHandler {
    Arc::new(|failure: &PledgeError| error!("{failure}"))
}

/// The handler currently installed.
pub fn fallback_handler() -> FallbackHandler {
    FALLBACK.read().clone()
}

/// Installs `handler` and returns the one it replaced.
pub fn set_fallback_handler(handler: FallbackHandler) -> FallbackHandler {
    std::mem::replace(&mut *FALLBACK.write(), handler)
}

/// Puts the logging handler back.
pub fn reset_fallback_handler() {
    set_fallback_handler(log_handler());
}

/// Installs `handler` until the returned guard is dropped.
///
/// # Examples
///
/// ```
/// use pledges::fallback::{fallback_handler, override_fallback_handler};
/// use pledges::PledgeError;
/// use std::sync::Arc;
///
/// let before = fallback_handler();
/// {
///     let _guard = override_fallback_handler(Arc::new(|_: &PledgeError| {}));
///     assert!(!Arc::ptr_eq(&before, &fallback_handler()));
/// }
/// assert!(Arc::ptr_eq(&before, &fallback_handler()));
/// ```
pub fn override_fallback_handler(handler: FallbackHandler) -> FallbackOverride {
    FallbackOverride {
        previous: Some(set_fallback_handler(handler)),
    }
}

#[must_use = "the previous handler comes back when this guard drops"]
pub struct FallbackOverride {
    previous: Option<FallbackHandler>,
}

impl Drop for FallbackOverride {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_fallback_handler(previous);
        }
    }
}

/// Reports `rejection` as uncaught, preferring the config's own handler.
pub(crate) fn report_uncaught(config: &PledgeConfig, rejection: &PledgeError) {
    let failure = PledgeError::uncaught(rejection);
    match config.fallback_override() {
        Some(handler) => handler(&failure),
        None => fallback_handler()(&failure),
    }
}
