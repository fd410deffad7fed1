//! Granular Stores
//!
//! A store wraps a nested JSON value so that each field and element can be
//! read and written individually. Reading a path from a memo or effect
//! subscribes to exactly that path; writing a path notifies exactly its
//! readers.
//!
//! # Reading
//!
//! [`Store::get`] reads a value and [`Store::at`] steps into a nested record
//! or array. Both are tracked:
//!
//! ```rust
//! use kinetic_core::store::create_store;
//! use serde_json::json;
//!
//! let (state, set_state) = create_store(json!({"user": {"name": "Ada"}})).unwrap();
//! let user = state.at("user").unwrap();
//! assert_eq!(user.get("name"), Some(json!("Ada")));
//! ```
//!
//! # Writing
//!
//! [`SetStore::set`] takes a path (see [`path!`](crate::path)) and an
//! [`Update`]. A record written over a record is shallow-merged; anything
//! else is replaced:
//!
//! ```rust
//! use kinetic_core::path;
//! use kinetic_core::store::{create_store, Update};
//! use serde_json::json;
//!
//! let (state, set_state) = create_store(json!({"todos": [{"done": false}]})).unwrap();
//! set_state.set(path!["todos", 0, "done"], true).unwrap();
//! set_state.set(path!["todos", 1], json!({"done": false})).unwrap();
//! set_state.set(path!["todos", 0, "done"], Update::with(|done| !done.as_bool().unwrap_or(false))).unwrap();
//!
//! assert_eq!(state.snapshot(), json!({"todos": [{"done": false}, {"done": false}]}));
//! ```
//!
//! # Containers
//!
//! Reading a nested record or array subscribes to the container itself, not
//! its contents. Writes through paths below it do not notify that reader;
//! replacing the container as a whole does.

mod node;
mod path;
mod resolver;

pub use node::StoreNodeId;
pub use path::{filter, filter_indexed, range, range_by, Key, PathSegment, Predicate, Update};

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace};

use self::node::{CellValue, StoreNode};
use crate::error::{ReactiveError, Result};
use crate::graph::NodeId;
use crate::reactive::{batch, untrack, ReactiveContext};

/// Read view of a store node.
#[derive(Clone)]
pub struct Store {
    node: Rc<StoreNode>,
}

impl Store {
    /// Step into the record or array at `key`.
    ///
    /// Returns `None` if the key is missing or holds a leaf. The same child
    /// is returned until it is replaced.
    pub fn at(&self, key: impl Into<Key>) -> Option<Store> {
        let key = key.into();
        match self.node.cell(&key).get() {
            CellValue::Node(_) => self.node.child(&key).map(|node| Store { node }),
            CellValue::Plain(_) | CellValue::Absent => None,
        }
    }

    /// Read the value at `key`. Records and arrays come back as a copy.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        match self.node.cell(&key).get() {
            CellValue::Absent => None,
            CellValue::Plain(value) => Some(value),
            CellValue::Node(_) => self.node.child(&key).map(|node| node.snapshot()),
        }
    }

    /// Number of fields or elements. Tracks additions and removals.
    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field names or indices, in order. Tracks additions and removals.
    pub fn keys(&self) -> Vec<Key> {
        self.node.keys()
    }

    pub fn is_array(&self) -> bool {
        self.node.is_array()
    }

    /// Untracked deep copy of the current data.
    pub fn snapshot(&self) -> Value {
        self.node.snapshot()
    }

    /// Whether both views wrap the same node.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    pub fn id(&self) -> StoreNodeId {
        self.node.id()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.node.id())
            .field("value", &self.node.snapshot())
            .finish()
    }
}

/// Write handle of a store.
#[derive(Clone)]
pub struct SetStore {
    root: Rc<StoreNode>,
    /// Scope in effect at construction. Writes are ignored once it is gone.
    owner: Option<NodeId>,
}

impl SetStore {
    /// Apply `update` at every location `path` addresses.
    ///
    /// The whole path is resolved before anything is written, and all
    /// writes of one call are flushed together. An empty path updates the
    /// root.
    pub fn set(&self, path: Vec<PathSegment>, update: impl Into<Update>) -> Result<()> {
        if self.owner.is_some_and(|owner| !crate::reactive::contains(owner)) {
            debug!(store = %self.root.id(), "write to store of a disposed scope ignored");
            return Ok(());
        }
        crate::reactive::check_write()?;

        let update = update.into();
        let root = &self.root;
        untrack(|| {
            if path.is_empty() {
                trace!(store = %root.id(), "updating store root");
                return batch(|| resolver::apply_root(root, &update))?;
            }

            let targets = resolver::resolve(root, &path)?;
            batch(|| {
                targets
                    .iter()
                    .try_for_each(|(node, key)| resolver::apply(node, key, &update))
            })?
        })
    }
}

impl fmt::Debug for SetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetStore")
            .field("root", &self.root.id())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Wrap a record or array in a store.
pub fn create_store(initial: Value) -> Result<(Store, SetStore)> {
    let kind = match &initial {
        Value::Object(_) | Value::Array(_) => None,
        Value::Null => Some("null"),
        Value::Bool(_) => Some("bool"),
        Value::Number(_) => Some("number"),
        Value::String(_) => Some("string"),
    };
    if let Some(kind) = kind {
        return Err(ReactiveError::InvalidStoreRoot { kind });
    }

    let root = StoreNode::new(initial);
    debug!(store = %root.id(), "created store");
    Ok((
        Store {
            node: Rc::clone(&root),
        },
        SetStore {
            root,
            owner: ReactiveContext::current_owner(),
        },
    ))
}
