//! Equality Policies
//!
//! Every signal and memo decides whether a new value is a change with an
//! [`Equality`] policy. Equal values are not propagated, which is what lets
//! a memo shield its observers from upstream churn.

use std::fmt;
use std::rc::Rc;

/// How a cell decides whether a new value differs from the current one.
pub enum Equality<T: ?Sized> {
    /// Never treat values as equal: every write propagates.
    Disabled,

    /// Treat values as equal when the comparator returns `true`.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T: ?Sized> Equality<T> {
    /// Compare with a custom function. Returning `true` suppresses
    /// propagation.
    pub fn custom<F>(comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self::Custom(Rc::new(comparator))
    }

    /// Compare with `PartialEq`. This is the default policy.
    pub fn partial_eq() -> Self
    where
        T: PartialEq + 'static,
    {
        Self::custom(|prev: &T, next: &T| prev == next)
    }

    /// Whether `next` should be considered unchanged from `prev`.
    pub fn is_equal(&self, prev: &T, next: &T) -> bool {
        match self {
            Self::Disabled => false,
            Self::Custom(comparator) => comparator(prev, next),
        }
    }
}

impl<T: PartialEq + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::partial_eq()
    }
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Disabled => Self::Disabled,
            Self::Custom(comparator) => Self::Custom(Rc::clone(comparator)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Equality::Disabled"),
            Self::Custom(_) => f.write_str("Equality::Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_partial_eq() {
        let equality = Equality::<i32>::default();
        assert!(equality.is_equal(&1, &1));
        assert!(!equality.is_equal(&1, &2));
    }

    #[test]
    fn disabled_never_matches() {
        let equality = Equality::<i32>::Disabled;
        assert!(!equality.is_equal(&1, &1));
    }

    #[test]
    fn custom_comparator_decides() {
        // Equal when the parity matches
        let equality = Equality::custom(|a: &i32, b: &i32| a % 2 == b % 2);
        assert!(equality.is_equal(&1, &3));
        assert!(!equality.is_equal(&1, &2));
    }
}
