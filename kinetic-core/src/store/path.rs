//! Path Descriptors
//!
//! A store write is addressed by a path of segments followed by one
//! [`Update`]. Each segment selects one or more keys at its nesting level:
//!
//! | Segment                  | Selects                                  |
//! |--------------------------|------------------------------------------|
//! | `"field"` / `3`          | one record field or array index          |
//! | `["a", "b"]` / `[0, 2]`  | each listed key                          |
//! | `0..=4`, [`range_by`]    | an inclusive index range (arrays only)   |
//! | [`filter`]               | indices whose element passes a predicate |
//!
//! The rest of the path is applied independently to every selected key.

use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

/// A single record field or array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Tests an array element and its index.
pub type Predicate = Rc<dyn Fn(&Value, usize) -> bool>;

/// One level of a store path.
#[derive(Clone)]
pub enum PathSegment {
    Key(Key),
    Keys(Vec<Key>),
    /// Indices `from..=to`, every `by`-th one.
    Range { from: usize, to: usize, by: usize },
    /// Indices whose current element satisfies the predicate.
    Filter(Predicate),
}

impl fmt::Debug for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.debug_tuple("Key").field(key).finish(),
            PathSegment::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            PathSegment::Range { from, to, by } => f
                .debug_struct("Range")
                .field("from", from)
                .field("to", to)
                .field("by", by)
                .finish(),
            PathSegment::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Keys(keys) => {
                f.write_str("[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("]")
            }
            PathSegment::Range { from, to, by: 1 } => write!(f, "{from}..={to}"),
            PathSegment::Range { from, to, by } => write!(f, "{from}..={to} by {by}"),
            PathSegment::Filter(_) => f.write_str("<filter>"),
        }
    }
}

impl From<Key> for PathSegment {
    fn from(key: Key) -> Self {
        PathSegment::Key(key)
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Key(name.into())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Key(name.into())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Key(index.into())
    }
}

impl From<Vec<Key>> for PathSegment {
    fn from(keys: Vec<Key>) -> Self {
        PathSegment::Keys(keys)
    }
}

impl<const N: usize> From<[usize; N]> for PathSegment {
    fn from(indices: [usize; N]) -> Self {
        PathSegment::Keys(indices.into_iter().map(Key::Index).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PathSegment {
    fn from(names: [&str; N]) -> Self {
        PathSegment::Keys(names.into_iter().map(Key::from).collect())
    }
}

impl From<RangeInclusive<usize>> for PathSegment {
    fn from(range: RangeInclusive<usize>) -> Self {
        range_by(*range.start(), *range.end(), 1)
    }
}

/// Indices `from..=to`.
pub fn range(from: usize, to: usize) -> PathSegment {
    range_by(from, to, 1)
}

/// Every `by`-th index of `from..=to`. A step of zero is rejected when the
/// path is resolved.
pub fn range_by(from: usize, to: usize, by: usize) -> PathSegment {
    PathSegment::Range { from, to, by }
}

/// Indices whose element satisfies `predicate`.
pub fn filter(predicate: impl Fn(&Value) -> bool + 'static) -> PathSegment {
    PathSegment::Filter(Rc::new(move |item, _| predicate(item)))
}

/// Indices whose element and position satisfy `predicate`.
pub fn filter_indexed(predicate: impl Fn(&Value, usize) -> bool + 'static) -> PathSegment {
    PathSegment::Filter(Rc::new(predicate))
}

/// Render a path for error messages, e.g. `todos.[0, 2].completed`.
pub(crate) fn render(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Build a store path from heterogeneous segments.
///
/// ```rust
/// use kinetic_core::path;
/// use kinetic_core::store::{filter, PathSegment};
///
/// let path: Vec<PathSegment> = path!["todos", 0..=1, "completed"];
/// assert_eq!(path.len(), 3);
///
/// let path = path!["todos", filter(|todo| todo["completed"] == true), "task"];
/// assert_eq!(path.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        ::std::vec::Vec::<$crate::store::PathSegment>::new()
    };
    ($($segment:expr),+ $(,)?) => {
        ::std::vec![$($crate::store::PathSegment::from($segment)),+]
    };
}

/// The terminal of a store write.
#[derive(Clone)]
pub enum Update {
    /// Shallow-merged into a record when both sides are records, otherwise
    /// written in place of the current value.
    Value(Value),

    /// Shallow merge; `None` removes the key.
    Merge(IndexMap<String, Option<Value>>),

    /// Remove the addressed record field.
    Remove,

    /// Computes the update from the current value (`Null` when absent).
    With(Rc<dyn Fn(&Value) -> Update>),
}

impl Update {
    /// Build a merge from `(key, value)` pairs, where `None` removes the key.
    pub fn merge<K: Into<String>>(entries: impl IntoIterator<Item = (K, Option<Value>)>) -> Self {
        Update::Merge(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Compute the update from the current value.
    pub fn with<U: Into<Update>>(updater: impl Fn(&Value) -> U + 'static) -> Self {
        Update::With(Rc::new(move |prev| updater(prev).into()))
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Update::Merge(entries) => f.debug_tuple("Merge").field(entries).finish(),
            Update::Remove => f.write_str("Remove"),
            Update::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Value(value)
    }
}

impl From<bool> for Update {
    fn from(value: bool) -> Self {
        Update::Value(value.into())
    }
}

impl From<i64> for Update {
    fn from(value: i64) -> Self {
        Update::Value(value.into())
    }
}

impl From<f64> for Update {
    fn from(value: f64) -> Self {
        Update::Value(value.into())
    }
}

impl From<&str> for Update {
    fn from(value: &str) -> Self {
        Update::Value(value.into())
    }
}

impl From<String> for Update {
    fn from(value: String) -> Self {
        Update::Value(value.into())
    }
}
