//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is queued and runs once the current flush
//!    (or the creation itself, outside any flush) settles. The first run
//!    establishes its dependencies.
//!
//! 2. When any dependency changes, the effect is queued to re-run after all
//!    memos of the flush have settled.
//!
//! 3. Before re-running, the effect disposes the computations it created,
//!    runs its cleanups, and clears its old dependencies. New ones are
//!    tracked during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a tracked value; an effect's return value is only handed
//!   back to its own next run.
//! - Memos are lazy (compute on access); effects are eager.
//! - Memos must not write signals; effects may, and their writes are
//!   processed in the next pass of the same flush.
//!
//! # Cleanup
//!
//! Call [`on_cleanup`](super::on_cleanup) inside the effect to register a
//! function that runs before the next run and when the effect is disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime;
use crate::error::Result;
use crate::graph::{Computation, Node, NodeId};

struct EffectInner<T> {
    run: RefCell<Box<dyn FnMut(Option<T>) -> T>>,

    /// Return value of the previous run.
    value: RefCell<Option<T>>,

    run_count: Rc<Cell<usize>>,
}

impl<T: 'static> Computation for EffectInner<T> {
    fn run(&self) -> bool {
        let prev = self.value.borrow_mut().take();
        let next = (self.run.borrow_mut())(prev);
        *self.value.borrow_mut() = Some(next);

        self.run_count.set(self.run_count.get() + 1);
        // Nothing observes an effect
        false
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use kinetic_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let c = count.clone();
/// let effect = Effect::new(move |_| {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    /// Graph node for dependency tracking.
    id: NodeId,

    /// Number of times the effect has run.
    run_count: Rc<Cell<usize>>,
}

impl Effect {
    /// Create an effect and schedule its first run.
    ///
    /// `run` receives the value it returned on its previous run, or `None`
    /// the first time. Errors from the flush that performs the first run are
    /// reported rather than returned; see [`Effect::try_new`].
    pub fn new<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> Self {
        let (effect, outcome) = Self::create(run);
        if let Err(err) = outcome {
            runtime::report(err);
        }
        effect
    }

    /// Create an effect, returning any error raised by the flush that
    /// performs its first run.
    ///
    /// The effect stays registered with its owner even when this fails.
    pub fn try_new<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> Result<Self> {
        let (effect, outcome) = Self::create(run);
        outcome.map(|()| effect)
    }

    fn create<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> (Self, Result<()>) {
        let run_count = Rc::new(Cell::new(0));
        let inner = Rc::new(EffectInner {
            run: RefCell::new(Box::new(run)),
            value: RefCell::new(None),
            run_count: run_count.clone(),
        });

        let id = runtime::register_computation(Node::effect(inner));
        let outcome = runtime::schedule_effect(id);

        (Self { id, run_count }, outcome)
    }

    /// Get the effect's graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the effect: run its cleanups, dispose what it created and
    /// stop it from running again. Idempotent.
    pub fn dispose(&self) {
        runtime::dispose_node(self.id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !runtime::contains(self.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Create an effect. See [`Effect::new`].
pub fn create_effect<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> Effect {
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
