//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! signals and the computations that read them, plus the ownership tree that
//! decides which computations are disposed together.
//!
//! # Overview
//!
//! - Nodes represent signal cells, computations (memos, effects) or
//!   ownership roots.
//! - Dependency edges point from a source to its observers: if A read B
//!   during its last run, there is an edge from B to A.
//! - Ownership edges point from an owner to the computations created while
//!   it was running. They are unrelated to the dependency edges.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than distributed linked lists because:
//!    - It enables efficient topological ordering for batch updates
//!    - It simplifies cycle detection
//!    - Disposal can detach a node from both directions in one place
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (sources) and reverse (observers) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{Computation, Node, NodeId, NodeKind, NodeState};
pub use scheduler::UpdateScheduler;
