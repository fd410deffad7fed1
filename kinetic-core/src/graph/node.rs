//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A signal cell. Sources have dependents but never dependencies.
    Source,

    /// A memo. Has dependencies, may have dependents, caches its output.
    Memo,

    /// An effect. Has dependencies but no dependents.
    Effect,

    /// An ownership scope created by `create_root`. Never part of the
    /// dependency graph, only of the ownership tree.
    Root,
}

impl NodeKind {
    /// Whether nodes of this kind run a tracked function.
    pub fn is_computation(self) -> bool {
        matches!(self, Self::Memo | Self::Effect)
    }
}

/// Staleness of a node.
///
/// Ordered: `Clean < Check < Dirty`. Marking only ever raises the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    /// Up to date.
    Clean,

    /// An upstream memo may have changed; its sources must be brought up to
    /// date before deciding whether to rerun.
    Check,

    /// A direct source changed. The node must rerun.
    Dirty,
}

/// The rerunnable part of a memo or effect, erased over its value type.
pub trait Computation {
    /// Run the tracked function once.
    ///
    /// Returns whether the node's output changed under its equality policy.
    /// Effects always return `false`.
    fn run(&self) -> bool;
}

/// A node in the dependency graph.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current staleness.
    state: NodeState,

    /// Set while the node's function is on the stack.
    running: bool,

    /// Nodes this node read during its last run.
    sources: IndexSet<NodeId>,

    /// Nodes that read this node during their last run.
    observers: IndexSet<NodeId>,

    /// Owner in the ownership tree.
    owner: Option<NodeId>,

    /// Computations and scopes created while this node was the owner.
    owned: Vec<NodeId>,

    /// Callbacks run before the next rerun or at disposal.
    cleanups: Vec<Box<dyn FnOnce()>>,

    /// The function to rerun, for memos and effects.
    computation: Option<Rc<dyn Computation>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: match kind {
                NodeKind::Source | NodeKind::Root => NodeState::Clean,
                // Computations start dirty so the first read or flush runs them
                NodeKind::Memo | NodeKind::Effect => NodeState::Dirty,
            },
            running: false,
            sources: IndexSet::new(),
            observers: IndexSet::new(),
            owner: None,
            owned: Vec::new(),
            cleanups: Vec::new(),
            computation: None,
        }
    }

    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new memo node running `computation`.
    pub fn memo(computation: Rc<dyn Computation>) -> Self {
        let mut node = Self::new(NodeKind::Memo);
        node.computation = Some(computation);
        node
    }

    /// Create a new effect node running `computation`.
    pub fn effect(computation: Rc<dyn Computation>) -> Self {
        let mut node = Self::new(NodeKind::Effect);
        node.computation = Some(computation);
        node
    }

    /// Create a new ownership root.
    pub fn root() -> Self {
        Self::new(NodeKind::Root)
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current staleness.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Overwrite the staleness.
    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    /// Check if the node is up to date.
    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    /// Whether the node's function is currently executing.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Get the function this node reruns.
    pub fn computation(&self) -> Option<Rc<dyn Computation>> {
        self.computation.clone()
    }

    /// Add a source (a node that this node reads from).
    pub fn add_source(&mut self, node_id: NodeId) {
        self.sources.insert(node_id);
    }

    /// Remove a source.
    pub fn remove_source(&mut self, node_id: NodeId) {
        self.sources.shift_remove(&node_id);
    }

    /// Get all sources.
    pub fn sources(&self) -> &IndexSet<NodeId> {
        &self.sources
    }

    /// Remove all sources, returning them.
    pub fn take_sources(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.sources)
    }

    /// Add an observer (a node that reads from this node).
    pub fn add_observer(&mut self, node_id: NodeId) {
        self.observers.insert(node_id);
    }

    /// Remove an observer.
    pub fn remove_observer(&mut self, node_id: NodeId) {
        self.observers.shift_remove(&node_id);
    }

    /// Get all observers.
    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    /// Get the owner in the ownership tree.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<NodeId>) {
        self.owner = owner;
    }

    /// Record a child in the ownership tree.
    pub fn add_owned(&mut self, node_id: NodeId) {
        self.owned.push(node_id);
    }

    /// Forget a child in the ownership tree.
    pub fn remove_owned(&mut self, node_id: NodeId) {
        self.owned.retain(|id| *id != node_id);
    }

    /// Detach all owned children, returning them.
    pub fn take_owned(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.owned)
    }

    /// Register a cleanup callback.
    pub fn push_cleanup(&mut self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.push(cleanup);
    }

    /// Detach all cleanup callbacks, in registration order.
    pub fn take_cleanups(&mut self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.cleanups)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("running", &self.running)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .field("owner", &self.owner)
            .field("owned", &self.owned)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}
