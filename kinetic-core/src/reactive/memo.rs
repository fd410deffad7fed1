//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When a direct dependency changes, the memo is marked `Dirty`. When
//!    something further upstream changes, it is marked `Check`.
//!
//! 3. A `Check` memo first brings its memo sources up to date. If none of
//!    them produced a new value, it goes back to `Clean` without running.
//!
//! 4. When the memo reruns and its new value is equal to the old one under
//!    its [`Equality`] policy, its observers are not notified.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it through an intermediate memo
//! - The intermediate memo returns the same value
//! - None of the 10 memos rerun
//!
//! # Previous Values
//!
//! The computation receives the previous output, or the seed on its first
//! run, which makes reducers straightforward:
//!
//! ```rust
//! use kinetic_core::reactive::{Memo, Signal};
//!
//! let input = Signal::new(0);
//! let i = input.clone();
//! let sum = Memo::with_seed(move |prev: Option<&i32>| i.get() + prev.copied().unwrap_or(0), 0);
//!
//! assert_eq!(sum.get(), 0);
//! input.set(1);
//! input.set(2);
//! assert_eq!(sum.get(), 3);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::equality::Equality;
use super::runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, Node, NodeId, NodeState};

struct MemoInner<T> {
    compute: Box<dyn Fn(Option<&T>) -> T>,

    /// The cached value, or the seed before the first run.
    value: RefCell<Option<T>>,

    /// Whether the computation has produced a value yet.
    computed: Cell<bool>,

    equality: Equality<T>,
}

impl<T> MemoInner<T> {
    fn recompute(&self) -> T {
        (self.compute)(self.value.borrow().as_ref())
    }
}

impl<T: 'static> Computation for MemoInner<T> {
    fn run(&self) -> bool {
        let next = self.recompute();

        let first_run = !self.computed.replace(true);
        let changed = first_run
            || match self.value.borrow().as_ref() {
                Some(prev) => !self.equality.is_equal(prev, &next),
                None => true,
            };

        if changed {
            *self.value.borrow_mut() = Some(next);
        }
        changed
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Reading it requires `Clone`.
///
/// Memos are lazy: the computation does not run until the first read.
/// After that, changes to its dependencies recompute it during the flush
/// that follows the write.
pub struct Memo<T: 'static> {
    /// Graph node for dependency tracking.
    id: NodeId,

    inner: Rc<MemoInner<T>>,
}

impl<T: 'static> Memo<T> {
    /// Create a new memo compared with `PartialEq`.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn(Option<&T>) -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(compute, None, Equality::default())
    }

    /// Create a memo whose first run receives `seed` as its previous value.
    pub fn with_seed(compute: impl Fn(Option<&T>) -> T + 'static, seed: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(compute, Some(seed), Equality::default())
    }

    /// Create a memo with an optional seed and an explicit equality policy.
    pub fn with_options(
        compute: impl Fn(Option<&T>) -> T + 'static,
        seed: Option<T>,
        equality: Equality<T>,
    ) -> Self {
        let inner = Rc::new(MemoInner {
            compute: Box::new(compute),
            value: RefCell::new(seed),
            computed: Cell::new(false),
            equality,
        });
        let id = runtime::register_computation(Node::memo(inner.clone()));

        Self { id, inner }
    }

    /// Get the memo's graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Reading a disposed memo returns its last value. Errors discovered
    /// while bringing the memo up to date are returned; the memo keeps its
    /// last consistent value and is retried on the next flush.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        if !runtime::contains(self.id) {
            return self.last_value().ok_or(ReactiveError::Disposed { node: self.id });
        }

        runtime::update_if_necessary(self.id)?;
        runtime::track(self.id);
        self.last_value().ok_or(ReactiveError::Cycle { node: self.id })
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Errors are reported like [`Signal::set`](super::Signal::set) and the
    /// last value is returned instead.
    ///
    /// # Panics
    ///
    /// Panics if the memo reads itself before it has ever produced a value,
    /// since there is nothing to return. A computation that may read itself
    /// should use [`Memo::try_get`], which returns
    /// [`ReactiveError::Cycle`] instead.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self.try_get() {
            Ok(value) => value,
            Err(ReactiveError::Disposed { .. }) => self.compute_detached(),
            Err(err) => {
                runtime::report(err);
                match self.last_value() {
                    Some(value) => value,
                    None => panic!(
                        "memo {} read itself before producing a value; use `try_get` to handle the cycle",
                        self.id
                    ),
                }
            }
        }
    }

    /// Get the cached value without tracking or recomputing.
    ///
    /// Returns `None` if the memo has never been computed.
    pub fn get_untracked(&self) -> Option<T>
    where
        T: Clone,
    {
        self.last_value()
    }

    /// Dispose the memo: detach it from its sources, dispose what it owns
    /// and run its cleanups. Later reads return the last value.
    pub fn dispose(&self) {
        runtime::dispose_node(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !runtime::contains(self.id)
    }

    /// Check if the memo has produced a value.
    pub fn has_value(&self) -> bool {
        self.inner.computed.get()
    }

    /// Get the staleness of the memo, or `None` once disposed.
    pub fn state(&self) -> Option<NodeState> {
        runtime::node_state(self.id)
    }

    /// Get the number of computations that read this memo on their last
    /// run.
    pub fn dependent_count(&self) -> usize {
        runtime::observer_count(self.id)
    }

    fn last_value(&self) -> Option<T>
    where
        T: Clone,
    {
        if !self.inner.computed.get() {
            return None;
        }
        self.inner.value.borrow().clone()
    }

    /// A disposed memo that never ran still owes its reader a value. It is
    /// computed once, untracked and unowned.
    fn compute_detached(&self) -> T
    where
        T: Clone,
    {
        if let Some(value) = self.last_value() {
            return value;
        }

        let value = {
            let _ctx = ReactiveContext::enter_owner(None);
            self.inner.recompute()
        };
        self.inner.computed.set(true);
        *self.inner.value.borrow_mut() = Some(value.clone());
        value
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("value", &self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a memo compared with `PartialEq`.
pub fn create_memo<T: PartialEq + 'static>(compute: impl Fn(Option<&T>) -> T + 'static) -> Memo<T> {
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
