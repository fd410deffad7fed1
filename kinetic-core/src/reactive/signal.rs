//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    read is recorded and the computation becomes an observer.
//!
//! 2. When a write produces a value that differs under the signal's
//!    [`Equality`] policy, observers are marked stale.
//!
//! 3. The runtime then reruns the stale computations, unless the write
//!    happened inside a batch or a flush.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A graph node ID (8 bytes)
//! - The value, behind a `RefCell` in a shared allocation
//! - The equality policy
//!
//! The graph node is removed when the last handle is dropped.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::equality::Equality;
use super::runtime;
use crate::error::Result;
use crate::graph::NodeId;

struct SignalInner<T> {
    /// Graph node for dependency tracking.
    id: NodeId,

    /// Scope in effect at construction. Writes become no-ops once it is
    /// disposed.
    owner: Option<NodeId>,

    value: RefCell<T>,

    equality: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        runtime::release_source(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use kinetic_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, Equality::default())
    }

    /// Create a new signal with an explicit equality policy.
    pub fn with_equality(value: T, equality: Equality<T>) -> Self {
        Self::build(value, equality, ReactiveContext::current_owner())
    }

    /// Create a signal that is never made inert by its creation scope.
    pub(crate) fn detached(value: T, equality: Equality<T>) -> Self {
        Self::build(value, equality, None)
    }

    fn build(value: T, equality: Equality<T>, owner: Option<NodeId>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: runtime::register_source(),
                owner,
                value: RefCell::new(value),
                equality,
            }),
        }
    }

    /// Get the signal's graph node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as an observer.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        runtime::track(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// `f` must not write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::track(self.inner.id);
        f(&self.inner.value.borrow())
    }

    /// Set a new value and propagate it if it changed.
    ///
    /// Fails with a purity violation when called from inside a memo. Errors
    /// from the flush that the write triggers are returned as well.
    pub fn try_set(&self, value: T) -> Result<()> {
        if self.is_inert() {
            debug!(signal = %self.inner.id, "write to signal of a disposed scope ignored");
            return Ok(());
        }
        runtime::check_write()?;

        let unchanged = self
            .inner
            .equality
            .is_equal(&self.inner.value.borrow(), &value);
        if unchanged {
            return Ok(());
        }

        let _previous = self.inner.value.replace(value);
        trace!(signal = %self.inner.id, "signal changed");
        runtime::notify(self.inner.id)
    }

    /// Set a new value, reporting any error instead of returning it.
    ///
    /// Inside a computation or batch the error surfaces at the enclosing
    /// flush point. Elsewhere it is logged.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            runtime::report(err);
        }
    }

    /// Update the value using a function of the current value.
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&self.inner.value.borrow());
        self.try_set(next)
    }

    /// Like [`Signal::try_update`], reporting errors like [`Signal::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        if let Err(err) = self.try_update(f) {
            runtime::report(err);
        }
    }

    /// Split into a read half and a write half.
    pub fn split(&self) -> (ReadSignal<T>, WriteSignal<T>) {
        (
            ReadSignal {
                signal: self.clone(),
            },
            WriteSignal {
                signal: self.clone(),
            },
        )
    }

    /// Get the number of computations that read this signal on their last
    /// run.
    pub fn subscriber_count(&self) -> usize {
        runtime::observer_count(self.inner.id)
    }

    fn is_inert(&self) -> bool {
        self.inner
            .owner
            .is_some_and(|owner| !runtime::contains(owner))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// The read half of a signal.
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    /// See [`Signal::get`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.signal.get()
    }

    /// See [`Signal::get_untracked`].
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.signal.get_untracked()
    }

    /// See [`Signal::with`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    pub fn id(&self) -> NodeId {
        self.signal.id()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.signal).finish()
    }
}

/// The write half of a signal.
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> WriteSignal<T> {
    /// See [`Signal::set`].
    pub fn set(&self, value: T) {
        self.signal.set(value);
    }

    /// See [`Signal::try_set`].
    pub fn try_set(&self, value: T) -> Result<()> {
        self.signal.try_set(value)
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.signal.update(f);
    }

    /// See [`Signal::try_update`].
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        self.signal.try_update(f)
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.signal).finish()
    }
}

/// Create a signal and return its read and write halves.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
