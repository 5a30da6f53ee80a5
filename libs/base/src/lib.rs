//! Re-exports, types and helpers for all crates in this project.

#![deny(missing_docs)]

pub extern crate log;

#[macro_use]
mod macros;

pub mod prelude;

/// Re-exports from `error_chain`.
pub mod error_chain {
    pub use error_chain::*;
}

pub mod err;

/// Used to convert between integer representations.
#[inline]
pub fn convert<In, Out>(n: In, from: &'static str) -> Out
where
    In: std::convert::TryInto<Out> + std::fmt::Display + Copy,
    In::Error: std::fmt::Display,
{
    match n.try_into() {
        Ok(res) => res,
        Err(e) => panic!("[fatal] while converting {} ({}): {}", n, from, e),
    }
}

/// Returns what it's given.
pub fn identity<T>(t: T) -> T {
    t
}
/// Destroys what it's given.
pub fn destroy<T>(_: T) {}

/// Alias type for `SmallVec` of max stack-size 8.
pub type SVec8<T> = smallvec::SmallVec<[T; 8]>;
/// Alias type for `SmallVec` of max stack-size 16.
pub type SVec16<T> = smallvec::SmallVec<[T; 16]>;
/// Alias type for `SmallVec` of max stack-size 32.
pub type SVec32<T> = smallvec::SmallVec<[T; 32]>;
/// Alias type for `SmallVec` of max stack-size 64.
pub type SVec64<T> = smallvec::SmallVec<[T; 64]>;

/// Result of comparing a range to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RangeCmp {
    /// Value is strictly lower than the range's lower bound.
    Below,
    /// Value is inside the range.
    Inside,
    /// Values is strictly greater than the range's upper bound.
    Above,
}

/// A range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range<T> {
    /// Lower bound.
    pub lbound: T,
    /// Upper bound.
    pub ubound: T,
}
impl<T> Range<T> {
    /// Constructor.
    pub const fn new(lbound: T, ubound: T) -> Self {
        Self { lbound, ubound }
    }

    /// Applies an action to the range's bounds.
    pub fn map<U>(self, mut action: impl FnMut(T) -> U) -> Range<U> {
        Range::new(action(self.lbound), action(self.ubound))
    }

    /// Reference version of the range bounds.
    pub fn as_ref(&self) -> Range<&T> {
        Range::new(&self.lbound, &self.ubound)
    }

    /// The spread of the range.
    pub fn spread<Out>(self) -> Out
    where
        T: std::ops::Sub<T, Output = Out>,
    {
        self.ubound - self.lbound
    }
}
impl<T> Range<T>
where
    T: PartialOrd,
{
    /// Range/value comparison.
    pub fn cmp(&self, val: impl prelude::Borrow<T>) -> RangeCmp {
        let val = val.borrow();
        if val < &self.lbound {
            RangeCmp::Below
        } else if &self.ubound < val {
            RangeCmp::Above
        } else {
            debug_assert!(&self.lbound <= val);
            debug_assert!(val <= &self.ubound);
            RangeCmp::Inside
        }
    }

    /// True if the range contains some value.
    pub fn contains(&self, val: impl prelude::Borrow<T>) -> bool {
        match self.cmp(val) {
            RangeCmp::Inside => true,
            RangeCmp::Below | RangeCmp::Above => false,
        }
    }

    /// True if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.lbound > self.ubound
    }
}

impl<T> std::fmt::Display for Range<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "[{}, {}]", self.lbound, self.ubound)
    }
}

impl<T> From<(T, T)> for Range<T>
where
    T: PartialOrd,
{
    fn from((lbound, ubound): (T, T)) -> Self {
        Self::new(lbound, ubound)
    }
}
