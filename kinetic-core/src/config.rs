//! Runtime configuration.
//!
//! The runtime needs very little tuning. The knobs that exist are collected
//! in [`RuntimeConfig`], which can be built in code or parsed from JSON and
//! installed on the current thread with [`Runtime::configure`].
//!
//! [`Runtime::configure`]: crate::reactive::Runtime::configure

use serde::Deserialize;

/// Default limit on the number of passes a single flush may take.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 100_000;

/// Tunables for a thread's reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum number of passes one flush may run before it gives up.
    ///
    /// Each pass settles the memos and effects that were made stale by the
    /// previous one. Effects that keep writing to their own dependencies
    /// would otherwise loop forever.
    pub max_flush_iterations: usize,
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}
