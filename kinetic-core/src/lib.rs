//! Kinetic Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - A dependency graph with glitch-free, topologically ordered propagation
//! - Ownership scopes with cleanups and cascading disposal
//! - Granular stores over nested JSON data, written through path descriptors
//!
//! Rendering, templating and transport layers are expected to sit on top of
//! this crate and talk to it only through reads, writes and effects.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Dependency graph and update scheduling
//! - `store`: Nested reactive state and the path resolver
//! - `error`: The shared error type
//! - `config`: Runtime tunables
//!
//! # Example
//!
//! ```rust
//! use kinetic_core::{create_effect, create_memo, create_signal};
//!
//! // Create a signal
//! let (count, set_count) = create_signal(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = create_memo(move |_| c.get() * 2);
//!
//! // Create an effect
//! let d = doubled.clone();
//! create_effect(move |_| {
//!     println!("Count: {}, Doubled: {}", count.get(), d.get());
//! });
//!
//! // Update the signal
//! set_count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! assert_eq!(doubled.get(), 10);
//! ```
//!
//! # Threading
//!
//! Every thread has its own runtime. Handles are `!Send` and must stay on
//! the thread that created them.

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use reactive::{
    batch, create_effect, create_memo, create_root, create_signal, on_cleanup, run_with_owner,
    untrack, Effect, Equality, Memo, Owner, ReadSignal, Runtime, Signal, WriteSignal,
};
pub use store::{create_store, SetStore, Store, Update};
