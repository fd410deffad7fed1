//! Error types shared by the reactive runtime and the store layer.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors reported by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write was attempted while a memo's function was executing.
    ///
    /// The write is rejected; memos must be pure for the topological run
    /// order to hold.
    #[error("write rejected: memo {memo} is computing and must not write to reactive state")]
    PurityViolation {
        /// The memo that was running when the write happened.
        memo: NodeId,
    },

    /// A computation read a node whose pending recomputation depends on
    /// the reader itself.
    #[error("cyclic dependency detected while updating node {node}")]
    Cycle {
        /// The node that was re-entered.
        node: NodeId,
    },

    /// The node was disposed and can no longer be used this way.
    #[error("node {node} has been disposed")]
    Disposed {
        /// The disposed node.
        node: NodeId,
    },

    /// A store path could not be resolved against the current state.
    #[error("invalid store path at `{path}`: {reason}")]
    InvalidPath {
        /// The path up to (and including) the failing segment.
        path: String,
        /// Why the segment could not be applied.
        reason: String,
    },

    /// A store was constructed from a value that is not an object or array.
    #[error("store root must be an object or an array, got {kind}")]
    InvalidStoreRoot {
        /// The JSON kind that was supplied.
        kind: &'static str,
    },

    /// A flush kept scheduling new passes beyond the configured limit.
    #[error("flush exceeded {limit} passes; an effect is probably writing to its own dependency")]
    FlushLimitExceeded {
        /// The configured pass limit.
        limit: usize,
    },
}

/// Result alias used across the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_node() {
        let node = NodeId::from(7);
        let err = ReactiveError::Cycle { node };
        assert_eq!(err.to_string(), "cyclic dependency detected while updating node #7");

        let err = ReactiveError::InvalidPath {
            path: "todos.[1]".to_string(),
            reason: "index out of bounds".to_string(),
        };
        assert!(err.to_string().contains("todos.[1]"));
    }
}
