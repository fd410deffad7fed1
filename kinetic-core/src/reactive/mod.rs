//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Kinetic's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and it only notifies its own dependents when
//! the new result differs from the old one.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects run after every memo of the same flush has settled.
//!
//! ## Owners
//!
//! Computations belong to the computation or root that created them and are
//! disposed with it. See [`create_root`] and [`on_cleanup`].
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod equality;
mod memo;
mod owner;
mod runtime;
mod signal;

pub use context::ReactiveContext;
pub use effect::{create_effect, Effect};
pub use equality::Equality;
pub use memo::{create_memo, Memo};
pub use owner::{create_root, on_cleanup, run_with_owner, Owner};
pub use runtime::{batch, untrack, Runtime};
pub use signal::{create_signal, ReadSignal, Signal, WriteSignal};

pub(crate) use runtime::{check_write, contains};
