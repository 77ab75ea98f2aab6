//! `all` over tuples of differently typed pledges.
use std::any::type_name;

use crate::all::all_promises;
use crate::{AnyValue, Pledge, PledgeError, Promise, Settler};

/// A tuple of 2 to 11 pledges that can be joined into a pledge of the tuple
/// of their values.
pub trait PledgeTuple {
    type Output: Send + Sync + 'static;

    fn join(self, fail_fast: bool) -> Pledge<Self::Output>;
}

/// Joins a tuple of pledges. Errors pass through without index context.
///
/// # Examples
///
/// ```
/// use pledges::{all_tuple, Pledge};
/// use futures::executor::block_on;
///
/// let joined = all_tuple((Pledge::resolved(3684), Pledge::resolved("plops")), false);
/// assert_eq!(block_on(joined), Ok((3684, "plops")));
/// ```
pub fn all_tuple<P: PledgeTuple>(pledges: P, fail_fast: bool) -> Pledge<P::Output> {
    pledges.join(fail_fast)
}

fn take<T: Clone + 'static>(values: &[AnyValue], index: usize) -> Result<T, PledgeError> {
    values
        .get(index)
        .and_then(|value| value.downcast_ref::<T>())
        .cloned()
        .ok_or_else(|| {
            PledgeError::new(
                format!("slot {index} does not hold a {}", type_name::<T>()),
                PledgeError::TYPE_MISMATCH,
            )
        })
}

macro_rules! impl_pledge_tuple {
    ($($T:ident $index:tt),+) => {
        impl<$($T: Clone + Send + Sync + 'static),+> PledgeTuple for ($(Pledge<$T>,)+) {
            type Output = ($($T,)+);

            fn join(self, fail_fast: bool) -> Pledge<Self::Output> {
                fn rebuild<$($T: Clone + 'static),+>(
                    values: &[AnyValue],
                ) -> Result<($($T,)+), PledgeError> {
                    Ok(($(take::<$T>(values, $index)?,)+))
                }

                let promises: &[&dyn Promise] = &[$(&self.$index),+];
                let erased = all_promises(promises, fail_fast);
                Pledge::with_config(self.0.config(), move |settler: Settler<Self::Output>| {
                    let on_fail = settler.clone();
                    erased
                        .then(move |values| {
                            match rebuild::<$($T),+>(values) {
                                Ok(tuple) => settler.resolve(tuple),
                                Err(error) => settler.reject(error),
                            }
                        })
                        .fail(move |error| on_fail.reject(error));
                })
            }
        }
    };
}

impl_pledge_tuple!(A 0, B 1);
impl_pledge_tuple!(A 0, B 1, C 2);
impl_pledge_tuple!(A 0, B 1, C 2, D 3);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
impl_pledge_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
