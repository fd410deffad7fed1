//! Path Resolution
//!
//! A write runs in two phases. [`resolve`] walks the path against the
//! current data and produces every `(node, key)` location it addresses,
//! failing before anything is written if the path does not fit the data.
//! Predicates therefore only ever see pre-mutation elements. [`apply`] then
//! performs the terminal update at each location.

use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use super::node::{invalid, StoreNode};
use super::path::{render, Key, PathSegment, Update};
use crate::error::Result;

/// A resolved write location.
pub(crate) type Target = (Rc<StoreNode>, Key);

/// Resolve a non-empty path into write locations.
pub(crate) fn resolve(root: &Rc<StoreNode>, path: &[PathSegment]) -> Result<Vec<Target>> {
    let Some((last, parents)) = path.split_last() else {
        return Err(invalid("", "an empty path addresses the root"));
    };
    let rendered = || render(path);

    let mut nodes = vec![Rc::clone(root)];
    for segment in parents {
        let mut next = Vec::with_capacity(nodes.len());
        for node in &nodes {
            for key in expand(node, segment).map_err(|reason| invalid(rendered(), reason))? {
                match node.child(&key) {
                    Some(child) => next.push(child),
                    None => {
                        return Err(invalid(
                            rendered(),
                            format!("`{key}` is missing or is not a record or array"),
                        ))
                    }
                }
            }
        }
        nodes = next;
    }

    let mut targets = Vec::new();
    for node in nodes {
        for key in expand(&node, last).map_err(|reason| invalid(rendered(), reason))? {
            node.accepts(&key).map_err(|reason| invalid(rendered(), reason))?;
            targets.push((Rc::clone(&node), key));
        }
    }

    trace!(path = %rendered(), targets = targets.len(), "resolved store path");
    Ok(targets)
}

/// The keys a segment selects on `node`.
fn expand(node: &StoreNode, segment: &PathSegment) -> std::result::Result<Vec<Key>, String> {
    match segment {
        PathSegment::Key(key) => Ok(vec![key.clone()]),
        PathSegment::Keys(keys) => Ok(keys.clone()),
        PathSegment::Range { from, to, by } => {
            if !node.is_array() {
                return Err(format!("range {from}..={to} applied to a record"));
            }
            if *by == 0 {
                return Err("range step must be positive".to_owned());
            }
            // An index equal to the length appends, anything past it is invalid
            let len = node.untracked_len();
            if *to > len {
                return Err(format!(
                    "range {from}..={to} is past the end of an array of length {len}"
                ));
            }
            Ok((*from..=*to).step_by(*by).map(Key::Index).collect())
        }
        PathSegment::Filter(predicate) => {
            let items = node
                .items()
                .ok_or_else(|| "filter applied to a record".to_owned())?;
            Ok(items
                .iter()
                .enumerate()
                .filter(|(index, item)| predicate(item, *index))
                .map(|(index, _)| Key::Index(index))
                .collect())
        }
    }
}

/// Apply `update` at `key` of `node`.
pub(crate) fn apply(node: &StoreNode, key: &Key, update: &Update) -> Result<()> {
    match update {
        Update::Value(Value::Object(fields)) => match node.record_child(key) {
            Some(child) => child.merge(fields.iter().map(|(name, value)| (name.clone(), Some(value.clone())))),
            None => node.replace(key, Value::Object(fields.clone())),
        },
        Update::Value(value) => node.replace(key, value.clone()),
        Update::Merge(entries) => match node.record_child(key) {
            Some(child) => child.merge(entries.clone()),
            None => node.replace(
                key,
                Value::Object(
                    entries
                        .iter()
                        .filter_map(|(name, value)| Some((name.clone(), value.clone()?)))
                        .collect(),
                ),
            ),
        },
        Update::Remove => node.remove(key),
        Update::With(updater) => {
            let prev = node.value_at(key).unwrap_or(Value::Null);
            apply(node, key, &updater(&prev))
        }
    }
}

/// Apply `update` to the root node itself.
///
/// Records merge with a record; arrays are overwritten element by element
/// and truncated to the new length.
pub(crate) fn apply_root(root: &StoreNode, update: &Update) -> Result<()> {
    match update {
        Update::Value(Value::Object(fields)) if root.is_record() => {
            root.merge(fields.iter().map(|(name, value)| (name.clone(), Some(value.clone()))))
        }
        Update::Merge(entries) if root.is_record() => root.merge(entries.clone()),
        Update::Value(Value::Array(items)) if root.is_array() => {
            for (index, item) in items.iter().enumerate() {
                root.replace(&Key::Index(index), item.clone())?;
            }
            root.truncate(items.len())
        }
        Update::With(updater) => apply_root(root, &updater(&root.snapshot())),
        _ => Err(invalid(
            "",
            "the root only accepts a record merged into a record or an array written over an array",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::store::filter;
    use crate::ReactiveError;
    use serde_json::json;

    fn todos() -> Rc<StoreNode> {
        StoreNode::new(json!({
            "todos": [
                {"task": "a", "completed": true},
                {"task": "b", "completed": false},
                {"task": "c", "completed": true},
            ]
        }))
    }

    fn indices(targets: &[Target]) -> Vec<Key> {
        targets.iter().map(|(_, key)| key.clone()).collect()
    }

    #[test]
    fn key_list_targets_each_index() {
        let root = todos();
        let targets = resolve(&root, &path!["todos", [0, 2], "completed"]).unwrap();

        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|(_, key)| *key == Key::from("completed")));
    }

    #[test]
    fn filter_sees_current_elements() {
        let root = todos();
        let targets = resolve(&root, &path!["todos", filter(|todo| todo["completed"] == true)]).unwrap();
        assert_eq!(indices(&targets), vec![Key::Index(0), Key::Index(2)]);
    }

    #[test]
    fn stepped_range() {
        let root = StoreNode::new(json!([0, 1, 2, 3, 4]));
        let targets = resolve(&root, &path![crate::store::range_by(0, 4, 2)]).unwrap();
        assert_eq!(indices(&targets), vec![Key::Index(0), Key::Index(2), Key::Index(4)]);
    }

    #[test]
    fn range_past_the_end_is_rejected() {
        let root = todos();

        let err = resolve(&root, &path!["todos", crate::store::range(1, usize::MAX)]).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidPath { .. }));
        assert!(resolve(&root, &path!["todos", crate::store::range(1, 4)]).is_err());

        // Ending at the length appends
        let targets = resolve(&root, &path!["todos", crate::store::range(2, 3)]).unwrap();
        assert_eq!(indices(&targets), vec![Key::Index(2), Key::Index(3)]);
    }

    #[test]
    fn invalid_paths_are_rejected_before_writing() {
        let root = todos();

        let range_on_record = resolve(&root, &path![0..=1]).unwrap_err();
        assert!(matches!(range_on_record, ReactiveError::InvalidPath { .. }));

        let through_scalar = resolve(&root, &path!["todos", 0, "task", "x"]).unwrap_err();
        assert!(matches!(through_scalar, ReactiveError::InvalidPath { ref path, .. } if path == "todos.0.task.x"));

        // Index 5 is past the end even though 3 would append
        assert!(resolve(&root, &path!["todos", 5]).is_err());
        assert!(resolve(&root, &path!["todos", 3]).is_ok());

        assert!(resolve(&root, &path!["todos", crate::store::range_by(0, 1, 0)]).is_err());
        assert_eq!(root.snapshot()["todos"][0]["task"], "a");
    }

    #[test]
    fn value_merges_into_records_and_replaces_the_rest() {
        let root = StoreNode::new(json!({"user": {"first": "John", "last": "Miller"}, "tags": [1]}));

        apply(&root, &Key::from("user"), &json!({"first": "Johnny", "middle": "Lee"}).into()).unwrap();
        apply(&root, &Key::from("tags"), &json!([2, 3]).into()).unwrap();

        assert_eq!(
            root.snapshot(),
            json!({"user": {"first": "Johnny", "last": "Miller", "middle": "Lee"}, "tags": [2, 3]})
        );
    }

    #[test]
    fn merge_removes_absent_keys() {
        let root = StoreNode::new(json!({"user": {"a": 1, "b": 2}}));
        apply(&root, &Key::from("user"), &Update::merge([("a", None), ("c", Some(json!(3)))])).unwrap();
        assert_eq!(root.snapshot(), json!({"user": {"b": 2, "c": 3}}));
    }

    #[test]
    fn updater_sees_null_for_missing_keys() {
        let root = StoreNode::new(json!({}));
        let update = Update::with(|prev| if prev.is_null() { json!(1) } else { json!(2) });

        apply(&root, &Key::from("count"), &update).unwrap();
        assert_eq!(root.snapshot(), json!({"count": 1}));
        apply(&root, &Key::from("count"), &update).unwrap();
        assert_eq!(root.snapshot(), json!({"count": 2}));
    }

    #[test]
    fn root_updates() {
        let record = StoreNode::new(json!({"a": 1}));
        apply_root(&record, &json!({"b": 2}).into()).unwrap();
        assert_eq!(record.snapshot(), json!({"a": 1, "b": 2}));
        assert!(apply_root(&record, &json!([1]).into()).is_err());

        let list = StoreNode::new(json!([1, 2, 3]));
        apply_root(&list, &json!([9]).into()).unwrap();
        assert_eq!(list.snapshot(), json!([9]));
        assert!(apply_root(&list, &Update::Remove).is_err());
    }
}
