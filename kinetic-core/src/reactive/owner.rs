//! Ownership Scopes
//!
//! Every memo and effect is owned by the computation (or root) that was
//! running when it was created. Disposing an owner disposes everything it
//! owns, most recent first, and runs its cleanups.
//!
//! The ownership tree is separate from the dependency graph: a child may
//! read signals its owner never touches, and vice versa.

use std::fmt;

use tracing::debug;

use super::context::ReactiveContext;
use super::runtime;
use crate::graph::NodeId;

/// Handle to an ownership scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    id: NodeId,
}

impl Owner {
    /// Get the owner in effect, if any.
    pub fn current() -> Option<Self> {
        ReactiveContext::current_owner()
            .filter(|id| runtime::contains(*id))
            .map(|id| Self { id })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the scope and everything it owns. Idempotent.
    pub fn dispose(&self) {
        runtime::dispose_node(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !runtime::contains(self.id)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create a detached ownership scope and run `f` inside it.
///
/// The root is not disposed with the surrounding owner; call
/// [`Owner::dispose`] on the handle passed to `f`. Reads inside `f` are not
/// tracked.
pub fn create_root<R>(f: impl FnOnce(Owner) -> R) -> R {
    let owner = Owner {
        id: runtime::register_root(),
    };
    debug!(root = %owner.id, "created root scope");

    let _ctx = ReactiveContext::enter_owner(Some(owner.id));
    f(owner)
}

/// Run `f` with `owner` as the current owner, untracked.
///
/// Useful for callbacks that run outside any computation but should still
/// create children of a known scope.
pub fn run_with_owner<R>(owner: Owner, f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_owner(Some(owner.id));
    f()
}

/// Register a function to run before the current computation re-runs, or
/// when the current owner is disposed.
///
/// Without an owner the function can never run and is dropped.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) {
    let registered = ReactiveContext::current_owner()
        .is_some_and(|owner| runtime::add_cleanup(owner, Box::new(cleanup)));

    if !registered {
        debug!("cleanup registered outside an ownership scope will never run");
    }
}
