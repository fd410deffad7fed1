//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. Signals, memos and effects register a node with the runtime when they
//!    are created. Memos and effects are adopted by the current owner.
//!
//! 2. When a memo or effect reads a node, the edge is added to the graph
//!    right away, so a write later in the same run reaches the reader.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct observers `Dirty` and everything downstream `Check`
//!    b. Queues the stale memos and effects
//!    c. Flushes, unless a batch or another flush is in progress
//!
//! 4. A flush settles the queued memos in topological order, then runs the
//!    queued effects. Writes made by effects queue up for another pass.
//!
//! # Thread Safety
//!
//! The runtime is thread-confined. Each thread has its own graph, queues
//! and configuration, and reactive handles are `!Send`.

use std::cell::RefCell;

use indexmap::IndexSet;
use tracing::{debug, error, trace, trace_span, warn};

use super::context::ReactiveContext;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId, NodeKind, NodeState, UpdateScheduler};

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

/// Per-thread runtime state.
struct RuntimeState {
    graph: UpdateScheduler,
    config: RuntimeConfig,
    /// Open batches, plus computations running outside a flush.
    batch_depth: usize,
    flushing: bool,
    pending_memos: IndexSet<NodeId>,
    pending_effects: IndexSet<NodeId>,
    /// Nodes left stale by a failed update, re-queued when the flush ends.
    retry: IndexSet<NodeId>,
    /// First error recorded since the last flush point.
    error: Option<ReactiveError>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: UpdateScheduler::new(),
            config: RuntimeConfig::default(),
            batch_depth: 0,
            flushing: false,
            pending_memos: IndexSet::new(),
            pending_effects: IndexSet::new(),
            retry: IndexSet::new(),
            error: None,
        }
    }

    fn enqueue(&mut self, nodes: &[NodeId]) {
        for &id in nodes {
            match self.graph.get_node(id).map(Node::kind) {
                Some(NodeKind::Memo) => {
                    self.pending_memos.insert(id);
                }
                Some(NodeKind::Effect) => {
                    self.pending_effects.insert(id);
                }
                _ => {}
            }
        }
    }

    fn record_error(&mut self, err: ReactiveError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn is_idle(&self) -> bool {
        self.batch_depth == 0 && !self.flushing
    }
}

fn with_runtime<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
}

/// Like [`with_runtime`], but tolerates a runtime that is already borrowed
/// or torn down. Used from `Drop` impls.
fn try_with_runtime<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    RUNTIME
        .try_with(|runtime| runtime.try_borrow_mut().ok().map(|mut state| f(&mut state)))
        .ok()
        .flatten()
}

/// Facade over the current thread's reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install a configuration for this thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        debug!(?config, "configuring reactive runtime");
        with_runtime(|rt| rt.config = config);
    }

    /// Get the configuration of this thread's runtime.
    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config.clone())
    }

    /// Check if we're inside a computation that tracks reads.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Get the computation currently tracking reads, if any.
    pub fn current_observer() -> Option<NodeId> {
        ReactiveContext::current_observer()
    }

    /// Whether writes are currently being deferred.
    pub fn is_batching() -> bool {
        with_runtime(|rt| rt.batch_depth > 0)
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_runtime(|rt| rt.graph.node_count())
    }

    /// Settle everything that is still pending.
    ///
    /// Writes flush on their own; this is only needed to retry nodes that a
    /// previous flush left stale after an error.
    pub fn flush() -> Result<()> {
        flush()
    }
}

/// Run `f` with writes deferred until it returns.
///
/// Every memo affected by writes inside `f` recomputes at most once, when
/// the outermost batch ends. Reading a memo inside the batch still returns
/// an up-to-date value. Errors discovered by the closing flush are returned.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    let guard = BatchGuard::begin();
    let value = f();
    guard.finish()?;
    Ok(value)
}

/// Run `f` without registering its reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

/// Keeps the batch depth balanced even if the batched closure panics.
struct BatchGuard {
    finished: bool,
}

impl BatchGuard {
    fn begin() -> Self {
        with_runtime(|rt| rt.batch_depth += 1);
        Self { finished: false }
    }

    /// Close the batch, flushing if it was the outermost one.
    fn finish(mut self) -> Result<()> {
        self.finished = true;
        with_runtime(|rt| rt.batch_depth -= 1);
        flush()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if !self.finished {
            try_with_runtime(|rt| rt.batch_depth = rt.batch_depth.saturating_sub(1));
        }
    }
}

// ----------------------------------------------------------------------------
// Registration
// ----------------------------------------------------------------------------

/// Register a signal cell.
pub(crate) fn register_source() -> NodeId {
    with_runtime(|rt| rt.graph.add_node(Node::source()))
}

/// Remove a signal cell whose last handle was dropped.
pub(crate) fn release_source(id: NodeId) {
    let released = try_with_runtime(|rt| rt.graph.remove_node(id));
    if released.is_none() {
        trace!(node = %id, "runtime busy; signal node left in graph");
    }
}

/// Register a memo or effect, adopting it into the current owner.
pub(crate) fn register_computation(node: Node) -> NodeId {
    let owner = ReactiveContext::current_owner();
    with_runtime(|rt| {
        let id = rt.graph.add_node(node);
        match owner.filter(|owner| rt.graph.contains(*owner)) {
            Some(owner) => rt.graph.adopt(owner, id),
            None => debug!(node = %id, "computation created without an owner will never be disposed"),
        }
        id
    })
}

/// Register a detached ownership root.
pub(crate) fn register_root() -> NodeId {
    with_runtime(|rt| rt.graph.add_node(Node::root()))
}

/// Whether the node has not been disposed.
pub(crate) fn contains(id: NodeId) -> bool {
    with_runtime(|rt| rt.graph.contains(id))
}

pub(crate) fn node_state(id: NodeId) -> Option<NodeState> {
    with_runtime(|rt| rt.graph.get_node(id).map(Node::state))
}

pub(crate) fn observer_count(id: NodeId) -> usize {
    with_runtime(|rt| rt.graph.get_node(id).map_or(0, |node| node.observers().len()))
}

/// Register a cleanup on `owner`. Returns `false` if the owner is gone.
pub(crate) fn add_cleanup(owner: NodeId, cleanup: Box<dyn FnOnce()>) -> bool {
    with_runtime(|rt| match rt.graph.get_node_mut(owner) {
        Some(node) => {
            node.push_cleanup(cleanup);
            true
        }
        None => false,
    })
}

// ----------------------------------------------------------------------------
// Reads and writes
// ----------------------------------------------------------------------------

/// Record a read of `source` by the current observer.
///
/// The edge exists as soon as the read happens. An effect that later writes
/// `source` in the same run is marked stale and runs again.
pub(crate) fn track(source: NodeId) {
    let Some(observer) = ReactiveContext::current_observer() else {
        return;
    };
    let tracked = with_runtime(|rt| {
        let live = rt.graph.contains(observer) && rt.graph.contains(source);
        if live {
            rt.graph.add_edge(source, observer);
        }
        live
    });
    if tracked {
        ReactiveContext::track_dependency(source);
    }
}

/// Reject writes made while a memo is computing.
pub(crate) fn check_write() -> Result<()> {
    match ReactiveContext::pure_scope() {
        Some(memo) => Err(ReactiveError::PurityViolation { memo }),
        None => Ok(()),
    }
}

/// Propagate a change of `source` and flush if nothing is deferring it.
pub(crate) fn notify(source: NodeId) -> Result<()> {
    with_runtime(|rt| {
        let raised = rt.graph.mark_changed(source);
        trace!(node = %source, stale = raised.len(), "source changed");
        rt.enqueue(&raised);
    });
    flush()
}

/// Queue an effect for its first run.
pub(crate) fn schedule_effect(id: NodeId) -> Result<()> {
    with_runtime(|rt| {
        rt.pending_effects.insert(id);
    });
    flush()
}

/// Hand an error from an infallible API to whoever owns the current flush
/// point, or log it if there is none.
pub(crate) fn report(err: ReactiveError) {
    let observer = ReactiveContext::current_observer();
    let recorded = with_runtime(|rt| {
        if rt.is_idle() {
            return false;
        }
        if let Some(observer) = observer {
            rt.retry.insert(observer);
        }
        rt.record_error(err.clone());
        true
    });

    if !recorded {
        error!(%err, "reactive operation failed");
    }
}

// ----------------------------------------------------------------------------
// Scheduling
// ----------------------------------------------------------------------------

/// Settle all pending work, unless a batch or flush is already open.
pub(crate) fn flush() -> Result<()> {
    let limit = with_runtime(|rt| {
        if !rt.is_idle() {
            return None;
        }
        rt.flushing = true;
        Some(rt.config.max_flush_iterations)
    });
    let Some(limit) = limit else {
        return Ok(());
    };

    let _span = trace_span!("flush").entered();
    let mut passes = 0;
    loop {
        let (memos, effects) = with_runtime(|rt| {
            (
                std::mem::take(&mut rt.pending_memos),
                std::mem::take(&mut rt.pending_effects),
            )
        });
        if memos.is_empty() && effects.is_empty() {
            break;
        }

        passes += 1;
        if passes > limit {
            warn!(limit, "flush pass limit exceeded, leaving nodes stale");
            with_runtime(|rt| {
                rt.retry.extend(memos);
                rt.retry.extend(effects);
                rt.record_error(ReactiveError::FlushLimitExceeded { limit });
            });
            break;
        }

        let memos: Vec<_> = memos.into_iter().collect();
        let order = with_runtime(|rt| rt.graph.topological_sort(&memos));
        trace!(pass = passes, memos = order.len(), effects = effects.len(), "flush pass");

        for id in order {
            settle(id, update_if_necessary(id));
        }
        for id in effects {
            settle(id, run_top(id));
        }
    }

    with_runtime(|rt| {
        rt.flushing = false;
        let retry: Vec<_> = std::mem::take(&mut rt.retry).into_iter().collect();
        rt.enqueue(&retry);
        rt.error.take()
    })
    .map_or(Ok(()), Err)
}

fn settle(id: NodeId, outcome: Result<()>) {
    if let Err(err) = outcome {
        with_runtime(|rt| {
            rt.retry.insert(id);
            rt.record_error(err);
        });
    }
}

/// Run an effect, first running any stale effect that owns it.
///
/// A parent rerun disposes its children, so running it first keeps a child
/// from running once more against state its parent is about to replace.
fn run_top(id: NodeId) -> Result<()> {
    let chain = with_runtime(|rt| {
        let mut chain = vec![id];
        let mut current = rt.graph.get_node(id).and_then(Node::owner);
        while let Some(owner_id) = current {
            let Some(owner) = rt.graph.get_node(owner_id) else {
                break;
            };
            if owner.kind() == NodeKind::Effect && !owner.is_clean() {
                chain.push(owner_id);
            }
            current = owner.owner();
        }
        chain
    });

    for node in chain.into_iter().rev() {
        update_if_necessary(node)?;
    }
    Ok(())
}

/// Bring a node up to date.
///
/// `Dirty` nodes rerun. `Check` nodes first update their memo sources and
/// rerun only if one of those changed. Disposed nodes are ignored.
pub(crate) fn update_if_necessary(id: NodeId) -> Result<()> {
    let Some((state, running, kind)) = with_runtime(|rt| {
        rt.graph
            .get_node(id)
            .map(|node| (node.state(), node.is_running(), node.kind()))
    }) else {
        return Ok(());
    };

    if running {
        return Err(ReactiveError::Cycle { node: id });
    }
    if !kind.is_computation() || state == NodeState::Clean {
        return Ok(());
    }

    if state == NodeState::Check {
        let sources: Vec<NodeId> = with_runtime(|rt| {
            rt.graph
                .get_node(id)
                .map(|node| node.sources().iter().copied().collect())
                .unwrap_or_default()
        });

        for source in sources {
            let is_memo = with_runtime(|rt| {
                rt.graph.get_node(source).map(Node::kind) == Some(NodeKind::Memo)
            });
            if is_memo {
                update_if_necessary(source)?;
            }
            if node_state(id) == Some(NodeState::Dirty) {
                break;
            }
        }
    }

    match node_state(id) {
        Some(NodeState::Dirty) => run_node(id),
        Some(_) => {
            with_runtime(|rt| {
                if let Some(node) = rt.graph.get_node_mut(id) {
                    node.set_state(NodeState::Clean);
                }
            });
            Ok(())
        }
        None => Ok(()),
    }
}

/// Rerun a computation with a fresh tracking context.
fn run_node(id: NodeId) -> Result<()> {
    let Some((computation, kind)) = with_runtime(|rt| {
        rt.graph
            .get_node(id)
            .and_then(|node| node.computation().map(|c| (c, node.kind())))
    }) else {
        return Ok(());
    };

    let guard = BatchGuard::begin();
    clean_node(id);
    with_runtime(|rt| {
        if let Some(node) = rt.graph.get_node_mut(id) {
            node.set_running(true);
            // Cleared before the run so writes made during it re-stale the node
            node.set_state(NodeState::Clean);
        }
    });

    trace!(node = %id, ?kind, "running computation");
    let (changed, dependencies) = {
        let _ctx = ReactiveContext::enter(id, kind == NodeKind::Memo);
        let changed = computation.run();
        (changed, ReactiveContext::get_dependencies())
    };

    with_runtime(|rt| {
        let failed = rt.retry.contains(&id);
        let Some(node) = rt.graph.get_node_mut(id) else {
            return;
        };
        node.set_running(false);
        if failed {
            node.set_state(NodeState::Dirty);
        }

        trace!(node = %id, dependencies = dependencies.len(), changed, "computation finished");

        if changed {
            let raised = rt.graph.mark_changed(id);
            rt.enqueue(&raised);
        }
    });

    guard.finish()
}

/// Prepare a node for a rerun or disposal.
///
/// Disposes owned children, runs cleanups (most recent first) and detaches
/// the node from its sources.
fn clean_node(id: NodeId) {
    let (owned, cleanups) = with_runtime(|rt| {
        rt.graph.clear_sources(id);
        match rt.graph.get_node_mut(id) {
            Some(node) => (node.take_owned(), node.take_cleanups()),
            None => (Vec::new(), Vec::new()),
        }
    });

    for child in owned.into_iter().rev() {
        dispose_node(child);
    }

    if !cleanups.is_empty() {
        let _ctx = ReactiveContext::enter_cleanup();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

/// Dispose a node and everything it owns.
///
/// Idempotent: disposing a node that is already gone does nothing.
pub(crate) fn dispose_node(id: NodeId) {
    if !contains(id) {
        return;
    }

    debug!(node = %id, "disposing node");
    clean_node(id);

    let removed = with_runtime(|rt| {
        rt.pending_memos.shift_remove(&id);
        rt.pending_effects.shift_remove(&id);
        rt.retry.shift_remove(&id);
        rt.graph.remove_node(id)
    });

    // Dropped outside the borrow: the computation may own signals whose
    // `Drop` needs the runtime.
    drop(removed);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
