//! Store Nodes
//!
//! A store node mirrors one record or array of the backing data. Children
//! are kept as plain values until someone reads through them, at which point
//! they are wrapped in their own node. Signal cells are created per key on
//! first read and kept in a cache, so repeated reads of the same path hit
//! the same cells and the same child nodes.
//!
//! A cell holds either a plain leaf or the identity of a child node. Writes
//! below a child leave the parent's cell untouched; replacing the child
//! creates a new node and therefore changes the parent's cell.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::path::Key;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Equality, Signal};

/// Unique identifier of a store node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreNodeId(u64);

impl StoreNodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StoreNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// What a key's cell currently holds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellValue {
    Absent,
    Plain(Value),
    Node(StoreNodeId),
}

enum Slot {
    /// A leaf, or an aggregate nobody has read through yet.
    Plain(Value),
    Node(Rc<StoreNode>),
}

impl Slot {
    /// Aggregates written into the store get a fresh node.
    fn wrap(value: Value) -> Self {
        if is_aggregate(&value) {
            Slot::Node(StoreNode::new(value))
        } else {
            Slot::Plain(value)
        }
    }

    fn cell_value(&self) -> CellValue {
        match self {
            Slot::Plain(value) => CellValue::Plain(value.clone()),
            Slot::Node(node) => CellValue::Node(node.id),
        }
    }

    fn snapshot(&self) -> Value {
        match self {
            Slot::Plain(value) => value.clone(),
            Slot::Node(node) => node.snapshot(),
        }
    }

    /// Structural equality with `value`, without copying wrapped children.
    fn matches(&self, value: &Value) -> bool {
        match self {
            Slot::Plain(plain) => plain == value,
            Slot::Node(node) => node.matches(value),
        }
    }

    /// Wrap a plain aggregate in place and return the child node.
    fn expand(&mut self) -> Option<Rc<StoreNode>> {
        if let Slot::Plain(value) = self {
            if !is_aggregate(value) {
                return None;
            }
            *self = Slot::Node(StoreNode::new(value.take()));
        }
        match self {
            Slot::Node(node) => Some(Rc::clone(node)),
            Slot::Plain(_) => None,
        }
    }
}

enum Shape {
    Record(IndexMap<String, Slot>),
    List(Vec<Slot>),
}

impl Shape {
    fn slot_mut(&mut self, key: &Key) -> Option<&mut Slot> {
        match (self, key) {
            (Shape::Record(fields), Key::Field(name)) => fields.get_mut(name),
            (Shape::List(items), Key::Index(index)) => items.get_mut(*index),
            _ => None,
        }
    }

    fn slot(&self, key: &Key) -> Option<&Slot> {
        match (self, key) {
            (Shape::Record(fields), Key::Field(name)) => fields.get(name),
            (Shape::List(items), Key::Index(index)) => items.get(*index),
            _ => None,
        }
    }
}

pub(crate) fn is_aggregate(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

pub(crate) fn invalid(path: impl fmt::Display, reason: impl Into<String>) -> ReactiveError {
    ReactiveError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Reactive mirror of one record or array.
pub(crate) struct StoreNode {
    id: StoreNodeId,
    data: RefCell<Shape>,
    cells: RefCell<HashMap<Key, Signal<CellValue>>>,
    /// Bumped when keys are added or removed.
    shape: Signal<u64>,
}

impl StoreNode {
    /// Wrap an aggregate. Scalars become an empty record.
    pub(crate) fn new(value: Value) -> Rc<Self> {
        let data = match value {
            Value::Array(items) => Shape::List(items.into_iter().map(Slot::Plain).collect()),
            Value::Object(fields) => Shape::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, Slot::Plain(value)))
                    .collect(),
            ),
            _ => Shape::Record(IndexMap::new()),
        };

        Rc::new(Self {
            id: StoreNodeId::new(),
            data: RefCell::new(data),
            cells: RefCell::new(HashMap::new()),
            shape: Signal::detached(0, Equality::default()),
        })
    }

    pub(crate) fn id(&self) -> StoreNodeId {
        self.id
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(*self.data.borrow(), Shape::List(_))
    }

    pub(crate) fn is_record(&self) -> bool {
        !self.is_array()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Get the cell for `key`, creating it on first access.
    pub(crate) fn cell(&self, key: &Key) -> Signal<CellValue> {
        if let Some(cell) = self.cells.borrow().get(key) {
            return cell.clone();
        }

        // Wrap first so the cell starts out pointing at the child node
        self.child(key);
        let value = self
            .data
            .borrow()
            .slot(key)
            .map_or(CellValue::Absent, Slot::cell_value);

        let cell = Signal::detached(value, Equality::default());
        self.cells.borrow_mut().insert(key.clone(), cell.clone());
        cell
    }

    /// Get the child node at `key`, wrapping a plain aggregate on first use.
    pub(crate) fn child(&self, key: &Key) -> Option<Rc<StoreNode>> {
        self.data.borrow_mut().slot_mut(key).and_then(Slot::expand)
    }

    /// Get the child node at `key` if it is a record.
    pub(crate) fn record_child(&self, key: &Key) -> Option<Rc<StoreNode>> {
        self.child(key).filter(|child| child.is_record())
    }

    /// Untracked copy of the value at `key`.
    pub(crate) fn value_at(&self, key: &Key) -> Option<Value> {
        self.data.borrow().slot(key).map(Slot::snapshot)
    }

    /// Untracked deep copy of the whole node.
    pub(crate) fn snapshot(&self) -> Value {
        match &*self.data.borrow() {
            Shape::Record(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, slot)| (name.clone(), slot.snapshot()))
                    .collect::<Map<_, _>>(),
            ),
            Shape::List(items) => Value::Array(items.iter().map(Slot::snapshot).collect()),
        }
    }

    /// Untracked structural comparison. Record field order is ignored, as
    /// in `Value` equality.
    pub(crate) fn matches(&self, value: &Value) -> bool {
        match (&*self.data.borrow(), value) {
            (Shape::Record(fields), Value::Object(other)) => {
                fields.len() == other.len()
                    && fields
                        .iter()
                        .all(|(name, slot)| other.get(name).is_some_and(|value| slot.matches(value)))
            }
            (Shape::List(items), Value::Array(other)) => {
                items.len() == other.len()
                    && items.iter().zip(other).all(|(slot, value)| slot.matches(value))
            }
            _ => false,
        }
    }

    /// Untracked copies of every array element, in order.
    pub(crate) fn items(&self) -> Option<Vec<Value>> {
        match &*self.data.borrow() {
            Shape::List(items) => Some(items.iter().map(Slot::snapshot).collect()),
            Shape::Record(_) => None,
        }
    }

    /// Number of fields or elements. Tracks the shape cell.
    pub(crate) fn len(&self) -> usize {
        self.shape.with(|_| ());
        self.untracked_len()
    }

    pub(crate) fn untracked_len(&self) -> usize {
        match &*self.data.borrow() {
            Shape::Record(fields) => fields.len(),
            Shape::List(items) => items.len(),
        }
    }

    /// Field names or indices, in order. Tracks the shape cell.
    pub(crate) fn keys(&self) -> Vec<Key> {
        self.shape.with(|_| ());
        match &*self.data.borrow() {
            Shape::Record(fields) => fields.keys().cloned().map(Key::Field).collect(),
            Shape::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Whether `key` can be written: an existing or new record field, or an
    /// index up to and including the array length.
    pub(crate) fn accepts(&self, key: &Key) -> std::result::Result<(), String> {
        match (&*self.data.borrow(), key) {
            (Shape::Record(_), Key::Field(_)) => Ok(()),
            (Shape::List(items), Key::Index(index)) if *index <= items.len() => Ok(()),
            (Shape::List(items), Key::Index(index)) => Err(format!(
                "index {index} is past the end of an array of length {}",
                items.len()
            )),
            (Shape::Record(_), Key::Index(index)) => Err(format!("index {index} used on a record")),
            (Shape::List(_), Key::Field(name)) => Err(format!("field `{name}` used on an array")),
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write `value` at `key`, replacing whatever is there. Writing at the
    /// array length appends.
    ///
    /// Structurally equal values are left alone, so their readers are not
    /// notified.
    pub(crate) fn replace(&self, key: &Key, value: Value) -> Result<()> {
        self.accepts(key).map_err(|reason| invalid(key, reason))?;

        let (cell_value, added, _previous) = {
            let mut data = self.data.borrow_mut();
            if data.slot(key).is_some_and(|slot| slot.matches(&value)) {
                return Ok(());
            }

            let slot = Slot::wrap(value);
            let cell_value = slot.cell_value();
            match (&mut *data, key) {
                (Shape::Record(fields), Key::Field(name)) => {
                    let previous = fields.insert(name.clone(), slot);
                    let added = previous.is_none();
                    (cell_value, added, previous)
                }
                (Shape::List(items), Key::Index(index)) if *index < items.len() => {
                    let previous = std::mem::replace(&mut items[*index], slot);
                    (cell_value, false, Some(previous))
                }
                (Shape::List(items), Key::Index(index)) if *index == items.len() => {
                    items.push(slot);
                    (cell_value, true, None)
                }
                _ => return Err(invalid(key, "key does not fit this node")),
            }
        };

        self.publish(key, cell_value)?;
        if added {
            self.bump_shape()?;
        }
        Ok(())
    }

    /// Shallow merge into this record; `None` removes the field.
    pub(crate) fn merge(&self, entries: impl IntoIterator<Item = (String, Option<Value>)>) -> Result<()> {
        for (name, value) in entries {
            let key = Key::Field(name);
            match value {
                Some(value) => self.replace(&key, value)?,
                None => self.remove(&key)?,
            }
        }
        Ok(())
    }

    /// Remove a record field. Removing a missing field does nothing.
    pub(crate) fn remove(&self, key: &Key) -> Result<()> {
        let removed = match (&mut *self.data.borrow_mut(), key) {
            (Shape::Record(fields), Key::Field(name)) => fields.shift_remove(name),
            (_, key) => return Err(invalid(key, "only record fields can be removed")),
        };

        if removed.is_some() {
            self.publish(key, CellValue::Absent)?;
            self.bump_shape()?;
        }
        Ok(())
    }

    /// Shorten this array to `len` elements.
    pub(crate) fn truncate(&self, len: usize) -> Result<()> {
        let removed = match &mut *self.data.borrow_mut() {
            Shape::List(items) if items.len() > len => items.split_off(len),
            Shape::List(_) => return Ok(()),
            Shape::Record(_) => return Err(invalid(self.id, "only arrays can be truncated")),
        };

        for index in len..len + removed.len() {
            self.publish(&Key::Index(index), CellValue::Absent)?;
        }
        self.bump_shape()
    }

    fn publish(&self, key: &Key, value: CellValue) -> Result<()> {
        let cell = self.cells.borrow().get(key).cloned();
        match cell {
            Some(cell) => cell.try_set(value),
            None => Ok(()),
        }
    }

    fn bump_shape(&self) -> Result<()> {
        self.shape.try_update(|version| version.wrapping_add(1))
    }
}

impl fmt::Debug for StoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreNode")
            .field("id", &self.id)
            .field("value", &self.snapshot())
            .field("cells", &self.cells.borrow().len())
            .finish()
    }
}
