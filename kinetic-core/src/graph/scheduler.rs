//! Update Scheduler
//!
//! The scheduler owns every node of the dependency graph and answers the two
//! questions the runtime asks when state changes: which nodes went stale, and
//! in what order should they be brought up to date.
//!
//! # Algorithm
//!
//! 1. When a source changes, its direct observers are marked `Dirty`.
//! 2. Observers of newly stale nodes are marked `Check`, transitively.
//! 3. The stale memos are sorted topologically (dependencies first).
//! 4. The runtime walks that order. A `Check` node first brings its memo
//!    sources up to date; it only reruns if one of them actually changed
//!    and marked it `Dirty`.
//!
//! Step 4 is what gives memos their shielding property: an upstream memo
//! that recomputes to an equal value never marks its observers `Dirty`.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use super::node::{Node, NodeId, NodeState};

/// The update scheduler manages the dependency graph and coordinates updates.
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all dependency edges involving this node and detaches it
    /// from its owner. Owned children are left to the caller.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for source_id in node.sources() {
            if let Some(source) = self.nodes.get_mut(source_id) {
                source.remove_observer(node_id);
            }
        }

        for observer_id in node.observers() {
            if let Some(observer) = self.nodes.get_mut(observer_id) {
                observer.remove_source(node_id);
            }
        }

        if let Some(owner) = node.owner().and_then(|id| self.nodes.get_mut(&id)) {
            owner.remove_owned(node_id);
        }

        Some(node)
    }

    /// Whether the node is still part of the graph.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Add a dependency edge: `observer` read `source`.
    pub fn add_edge(&mut self, source: NodeId, observer: NodeId) {
        if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&observer) {
            return;
        }
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.add_observer(observer);
        }
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            observer_node.add_source(source);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, source: NodeId, observer: NodeId) {
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.remove_observer(observer);
        }
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            observer_node.remove_source(source);
        }
    }

    /// Drop every edge from `observer` to its sources.
    pub fn clear_sources(&mut self, observer: NodeId) {
        let Some(node) = self.nodes.get_mut(&observer) else {
            return;
        };
        for source in node.take_sources() {
            if let Some(source_node) = self.nodes.get_mut(&source) {
                source_node.remove_observer(observer);
            }
        }
    }

    /// Record that an ownership scope created a child.
    pub fn adopt(&mut self, owner: NodeId, child: NodeId) {
        if let Some(owner_node) = self.nodes.get_mut(&owner) {
            owner_node.add_owned(child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.set_owner(Some(owner));
        }
    }

    /// Mark `source` as changed and propagate staleness.
    ///
    /// Direct observers become `Dirty`, everything downstream of a node that
    /// was clean becomes `Check`. Returns every node whose state was raised,
    /// in marking order.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut raised = Vec::new();
        let mut stack: Vec<(NodeId, NodeState)> = match self.nodes.get(&source_id) {
            Some(source) => source
                .observers()
                .iter()
                .rev()
                .map(|id| (*id, NodeState::Dirty))
                .collect(),
            None => return raised,
        };

        while let Some((node_id, state)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if node.state() >= state {
                continue;
            }

            let was_clean = node.is_clean();
            node.set_state(state);
            raised.push(node_id);

            // Observers of an already stale node were marked when it went stale
            if was_clean {
                stack.extend(
                    node.observers()
                        .iter()
                        .rev()
                        .map(|id| (*id, NodeState::Check)),
                );
            }
        }

        raised
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that sources come before observers.
    /// Nodes caught in a cycle cannot be ordered; they are appended at the
    /// end so the runtime can report the cycle when it reaches them.
    pub fn topological_sort(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in nodes {
            if in_degree.contains_key(&node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .sources()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for &observer_id in node.observers() {
                    if let Some(degree) = in_degree.get_mut(&observer_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(observer_id);
                        }
                    }
                }
            }
        }

        if result.len() < in_degree.len() {
            let placed: HashSet<_> = result.iter().copied().collect();
            let cyclic: Vec<_> = nodes
                .iter()
                .copied()
                .filter(|id| in_degree.contains_key(id) && !placed.contains(id))
                .collect();
            warn!(count = cyclic.len(), "stale nodes form a dependency cycle");
            for id in cyclic {
                if !result.contains(&id) {
                    result.push(id);
                }
            }
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Computation;
    use std::rc::Rc;

    struct Noop;

    impl Computation for Noop {
        fn run(&self) -> bool {
            false
        }
    }

    fn memo() -> Node {
        let mut node = Node::memo(Rc::new(Noop));
        node.set_state(NodeState::Clean);
        node
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = scheduler.add_node(Node::source());
        let id2 = scheduler.add_node(memo());
        scheduler.add_edge(id1, id2);

        assert_eq!(scheduler.node_count(), 2);

        let removed = scheduler.remove_node(id1).unwrap();
        assert_eq!(removed.id(), id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).unwrap().sources().is_empty());
    }

    #[test]
    fn add_and_remove_edges() {
        let mut scheduler = UpdateScheduler::new();

        let source_id = scheduler.add_node(Node::source());
        let memo_id = scheduler.add_node(memo());

        scheduler.add_edge(source_id, memo_id);

        assert!(scheduler
            .get_node(source_id)
            .unwrap()
            .observers()
            .contains(&memo_id));
        assert!(scheduler
            .get_node(memo_id)
            .unwrap()
            .sources()
            .contains(&source_id));

        scheduler.remove_edge(source_id, memo_id);

        assert!(scheduler.get_node(source_id).unwrap().observers().is_empty());
        assert!(scheduler.get_node(memo_id).unwrap().sources().is_empty());
    }

    #[test]
    fn clear_sources_detaches_both_directions() {
        let mut scheduler = UpdateScheduler::new();
        let a = scheduler.add_node(Node::source());
        let b = scheduler.add_node(Node::source());
        let m = scheduler.add_node(memo());
        scheduler.add_edge(a, m);
        scheduler.add_edge(b, m);

        scheduler.clear_sources(m);

        assert!(scheduler.get_node(m).unwrap().sources().is_empty());
        assert!(scheduler.get_node(a).unwrap().observers().is_empty());
        assert!(scheduler.get_node(b).unwrap().observers().is_empty());
    }

    #[test]
    fn mark_changed_colours_direct_and_transitive_observers() {
        let mut scheduler = UpdateScheduler::new();

        // source -> memo1 -> memo2
        let source_id = scheduler.add_node(Node::source());
        let memo1_id = scheduler.add_node(memo());
        let memo2_id = scheduler.add_node(memo());
        scheduler.add_edge(source_id, memo1_id);
        scheduler.add_edge(memo1_id, memo2_id);

        let raised = scheduler.mark_changed(source_id);

        assert_eq!(raised, vec![memo1_id, memo2_id]);
        assert_eq!(scheduler.get_node(memo1_id).unwrap().state(), NodeState::Dirty);
        assert_eq!(scheduler.get_node(memo2_id).unwrap().state(), NodeState::Check);

        // Marking again raises nothing
        assert!(scheduler.mark_changed(source_id).is_empty());
    }

    #[test]
    fn check_node_can_be_raised_to_dirty() {
        let mut scheduler = UpdateScheduler::new();
        let source_id = scheduler.add_node(Node::source());
        let memo1_id = scheduler.add_node(memo());
        let memo2_id = scheduler.add_node(memo());
        scheduler.add_edge(source_id, memo1_id);
        scheduler.add_edge(memo1_id, memo2_id);

        scheduler.mark_changed(source_id);
        let raised = scheduler.mark_changed(memo1_id);

        assert_eq!(raised, vec![memo2_id]);
        assert_eq!(scheduler.get_node(memo2_id).unwrap().state(), NodeState::Dirty);
    }

    #[test]
    fn topological_sort_orders_diamond() {
        let mut scheduler = UpdateScheduler::new();

        //        /-> left  -\
        // source             -> bottom
        //        \-> right -/
        let source = scheduler.add_node(Node::source());
        let left = scheduler.add_node(memo());
        let right = scheduler.add_node(memo());
        let bottom = scheduler.add_node(memo());
        scheduler.add_edge(source, left);
        scheduler.add_edge(source, right);
        scheduler.add_edge(left, bottom);
        scheduler.add_edge(right, bottom);

        let order = scheduler.topological_sort(&[bottom, right, left]);

        assert_eq!(order.len(), 3);
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(left) < pos(bottom));
        assert!(pos(right) < pos(bottom));
    }

    #[test]
    fn topological_sort_keeps_cyclic_nodes() {
        let mut scheduler = UpdateScheduler::new();
        let a = scheduler.add_node(memo());
        let b = scheduler.add_node(memo());
        scheduler.add_edge(a, b);
        scheduler.add_edge(b, a);

        let order = scheduler.topological_sort(&[a, b]);
        assert_eq!(order, vec![a, b]);
    }
}
