//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which scope owns newly created computations. This enables automatic
//! dependency tracking: when a signal is read, we can register the current
//! computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a memo or effect pushes an entry
//! whose observer and owner are that computation; `untrack` pushes an entry
//! with no observer; roots push an entry that only changes the owner. The
//! returned guard pops the entry when dropped.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo that has to recompute first).

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Dependencies collected during one run.
pub(crate) type Dependencies = SmallVec<[NodeId; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The computation whose reads are being tracked, if any.
    observer: Option<NodeId>,
    /// The scope that owns computations created in this entry.
    owner: Option<NodeId>,
    /// The memo whose function is executing, if any. Writes are rejected
    /// while this is set.
    pure: Option<NodeId>,
    /// Nodes read in this entry, in first-read order.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This keeps the context stack balanced even if the computation panics.
pub struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    fn push(entry: ContextEntry) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });

        Self { depth }
    }

    /// Enter the context of a running computation.
    ///
    /// Reads register `observer` as a dependent, and computations created
    /// while the context is active are owned by it. `pure` marks a memo run.
    pub fn enter(observer: NodeId, pure: bool) -> Self {
        Self::push(ContextEntry {
            observer: Some(observer),
            owner: Some(observer),
            pure: pure.then_some(observer),
            dependencies: SmallVec::new(),
        })
    }

    /// Enter an untracked context.
    ///
    /// Reads do not register dependencies. Ownership and purity are
    /// inherited from the enclosing context.
    pub fn enter_untracked() -> Self {
        let (owner, pure) = CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| (entry.owner, entry.pure))
                .unwrap_or((None, None))
        });

        Self::push(ContextEntry {
            observer: None,
            owner,
            pure,
            dependencies: SmallVec::new(),
        })
    }

    /// Enter an untracked context owned by `owner`.
    ///
    /// Purity is inherited, so a memo cannot write by opening a scope.
    pub fn enter_owner(owner: Option<NodeId>) -> Self {
        let pure = Self::pure_scope();
        Self::push(ContextEntry {
            observer: None,
            owner,
            pure,
            dependencies: SmallVec::new(),
        })
    }

    /// Enter the context cleanups run in: no observer, no owner, and writes
    /// allowed.
    pub(crate) fn enter_cleanup() -> Self {
        Self::push(ContextEntry {
            observer: None,
            owner: None,
            pure: None,
            dependencies: SmallVec::new(),
        })
    }

    /// Check if there is a computation tracking reads.
    pub fn is_active() -> bool {
        Self::current_observer().is_some()
    }

    /// Get the computation tracking reads, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// Get the scope that owns new computations, if any.
    pub fn current_owner() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }

    /// Get the memo whose function is executing, if writes are forbidden.
    pub fn pure_scope() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.pure))
    }

    /// Record a dependency on the given node.
    ///
    /// Does nothing outside a tracking context. Repeated reads of the same
    /// node are recorded once.
    pub fn track_dependency(node_id: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.observer.is_some() && !entry.dependencies.contains(&node_id) {
                    entry.dependencies.push(node_id);
                }
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();

            // Contexts must be exited in reverse order of entry.
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext mismatch: expected depth {}, got {}",
                self.depth,
                stack.len()
            );
            stack.pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(id, false);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_observer(), Some(id));
            assert_eq!(ReactiveContext::current_owner(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_owner().is_none());
    }

    #[test]
    fn context_tracks_dependencies_once() {
        let id = NodeId::new();
        let _ctx = ReactiveContext::enter(id, false);

        let (a, b) = (NodeId::new(), NodeId::new());
        ReactiveContext::track_dependency(a);
        ReactiveContext::track_dependency(b);
        ReactiveContext::track_dependency(a);

        let deps = ReactiveContext::get_dependencies();
        assert_eq!(deps.as_slice(), &[a, b]);
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1, false);
            assert_eq!(ReactiveContext::current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2, true);
                assert_eq!(ReactiveContext::current_observer(), Some(id2));
                assert_eq!(ReactiveContext::pure_scope(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_observer(), Some(id1));
            assert_eq!(ReactiveContext::pure_scope(), None);
        }

        assert!(ReactiveContext::current_observer().is_none());
    }

    #[test]
    fn untracked_context_inherits_owner_and_purity() {
        let memo = NodeId::new();
        let _ctx = ReactiveContext::enter(memo, true);

        {
            let _untracked = ReactiveContext::enter_untracked();
            assert!(!ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_owner(), Some(memo));
            assert_eq!(ReactiveContext::pure_scope(), Some(memo));

            ReactiveContext::track_dependency(NodeId::new());
            assert!(ReactiveContext::get_dependencies().is_empty());
        }

        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn owner_context_inherits_purity() {
        let memo = NodeId::new();
        let root = NodeId::new();
        let _ctx = ReactiveContext::enter(memo, true);
        let _root = ReactiveContext::enter_owner(Some(root));

        assert_eq!(ReactiveContext::current_owner(), Some(root));
        assert_eq!(ReactiveContext::pure_scope(), Some(memo));
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn cleanup_context_clears_purity() {
        let memo = NodeId::new();
        let _ctx = ReactiveContext::enter(memo, true);
        let _cleanup = ReactiveContext::enter_cleanup();

        assert_eq!(ReactiveContext::current_owner(), None);
        assert_eq!(ReactiveContext::pure_scope(), None);
    }
}
