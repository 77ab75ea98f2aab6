//! Pledges: single-assignment values that are resolved or rejected once,
//! with continuations, timeouts and aggregation.
//!
//! A [`Pledge`] is created with an action that receives its [`Settler`].
//! Consumers attach [`then`](Pledge::then) and [`fail`](Pledge::fail)
//! continuations, derive new pledges with [`map`](Pledge::map) and
//! [`flat_map`](Pledge::flat_map), join several with [`all`], or simply
//! `.await` them.
//!
//! # Examples
//!
//! ```
//! use pledges::{all, Pledge, PledgeConfig};
//! use futures::executor::block_on;
//! use std::thread;
//! use std::time::Duration;
//!
//! let config = PledgeConfig::new().timeout(Duration::from_secs(5));
//! let (price, settler) = Pledge::<u32>::pending_with(&config);
//! let total = all(vec![price, Pledge::resolved(3)], false).map(|v| v.iter().sum::<u32>());
//!
//! let task = thread::spawn(move || settler.resolve(39));
//! task.join().expect("The task thread has panicked.");
//! assert_eq!(block_on(total), Ok(42));
//! ```
use std::any::Any;
use std::sync::Arc;

pub mod all;
pub mod background;
mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod manual;
pub mod pledge;
pub mod tuple;

pub use all::{all, all_promises, all_with, AllOptions};
pub use background::{run_in_background, run_in_background_with};
pub use config::{PledgeConfig, DEFAULT_TIMEOUT};
pub use error::PledgeError;
pub use executor::Executor;
pub use pledge::{Pledge, PledgeState, Settler};
pub use tuple::{all_tuple, PledgeTuple};

/// A type-erased value as delivered by [`Promise::when_resolved`].
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// The least a producer has to offer to take part in [`all_promises`]:
/// somewhere to hang a success callback and a failure callback.
///
/// # Examples
///
/// ```
/// use pledges::{all_promises, AnyValue, Pledge, PledgeError, Promise};
/// use std::sync::Arc;
///
/// /// A producer that already knows its answer.
/// struct Ready(u16);
///
/// impl Promise for Ready {
///     fn when_resolved(&self, then: Box<dyn FnOnce(AnyValue) + Send>) {
///         let value: AnyValue = Arc::new(self.0);
///         then(value);
///     }
///     fn when_rejected(&self, _fail: Box<dyn FnOnce(PledgeError) + Send>) {}
/// }
///
/// let pledge = Pledge::resolved("mixed");
/// let joined = all_promises(&[&Ready(8), &pledge], false);
/// joined.then(|values| {
///     assert_eq!(values[0].downcast_ref::<u16>(), Some(&8));
///     assert_eq!(values[1].downcast_ref::<&str>(), Some(&"mixed"));
/// });
/// ```
pub trait Promise: Send + Sync {
    fn when_resolved(&self, then: Box<dyn FnOnce(AnyValue) + Send>);

    fn when_rejected(&self, fail: Box<dyn FnOnce(PledgeError) + Send>);

    /// The config pledges adapted from this promise should use.
    fn config(&self) -> PledgeConfig {
        PledgeConfig::default()
    }
}

impl<T: Clone + Send + Sync + 'static> Promise for Pledge<T> {
    fn when_resolved(&self, then: Box<dyn FnOnce(AnyValue) + Send>) {
        Pledge::then(self, move |value| {
            let erased: AnyValue = Arc::new(value.clone());
            then(erased)
        });
    }

    fn when_rejected(&self, fail: Box<dyn FnOnce(PledgeError) + Send>) {
        Pledge::fail(self, fail);
    }

    fn config(&self) -> PledgeConfig {
        Pledge::config(self).clone()
    }
}
