//! Integration Tests for Stores
//!
//! These tests drive stores through the public path API and observe them
//! from effects and memos.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kinetic_core::store::{filter, filter_indexed, range, Key};
use kinetic_core::{batch, create_effect, create_memo, create_store, path, ReactiveError, Update};
use serde_json::{json, Value};

fn todos() -> Value {
    json!({
        "todos": [
            {"task": "Finish work", "completed": false},
            {"task": "Go grocery shopping", "completed": true},
            {"task": "Make dinner", "completed": false},
        ]
    })
}

fn completed(state: &Value) -> Vec<bool> {
    state["todos"]
        .as_array()
        .map(|todos| todos.iter().map(|todo| todo["completed"] == true).collect())
        .unwrap_or_default()
}

/// Merging a record into the root adds and overwrites keys; a merge with an
/// absent value removes the key.
#[test]
fn merge_semantics() {
    let (state, set_state) = create_store(json!({"firstName": "John", "lastName": "Miller"})).unwrap();

    set_state
        .set(path![], json!({"firstName": "Johnny", "middleName": "Lee"}))
        .unwrap();
    assert_eq!(
        state.snapshot(),
        json!({"firstName": "Johnny", "lastName": "Miller", "middleName": "Lee"})
    );

    set_state.set(path![], json!({"preferredName": "Jonny"})).unwrap();
    assert_eq!(state.get("preferredName"), Some(json!("Jonny")));

    set_state
        .set(path![], Update::with(|_| Update::merge([("preferredName", None)])))
        .unwrap();
    assert_eq!(state.get("preferredName"), None);
    assert_eq!(
        state.keys(),
        vec![Key::from("firstName"), Key::from("lastName"), Key::from("middleName")]
    );
}

/// Key lists address each listed index and nothing else.
#[test]
fn key_list_addressing() {
    let (state, set_state) = create_store(todos()).unwrap();

    set_state.set(path!["todos", [0, 2], "completed"], true).unwrap();
    assert_eq!(completed(&state.snapshot()), vec![true, true, true]);

    set_state
        .set(path!["todos", [1], "completed"], false)
        .unwrap();
    assert_eq!(completed(&state.snapshot()), vec![true, false, true]);
}

/// Ranges toggle exactly the indices they cover.
#[test]
fn range_addressing() {
    let (state, set_state) = create_store(todos()).unwrap();

    let toggle = Update::with(|completed| !completed.as_bool().unwrap_or(false));
    set_state.set(path!["todos", 0..=1, "completed"], toggle.clone()).unwrap();
    assert_eq!(completed(&state.snapshot()), vec![true, false, false]);

    set_state.set(path!["todos", range(1, 2), "completed"], toggle).unwrap();
    assert_eq!(completed(&state.snapshot()), vec![true, true, true]);
}

/// Predicates select against the data as it was before the write.
#[test]
fn predicate_addressing() {
    let (state, set_state) = create_store(todos()).unwrap();

    set_state
        .set(
            path!["todos", filter(|todo| todo["completed"] == true), "task"],
            Update::with(|task| format!("{}!", task.as_str().unwrap_or_default())),
        )
        .unwrap();

    let snapshot = state.snapshot();
    assert_eq!(snapshot["todos"][0]["task"], "Finish work");
    assert_eq!(snapshot["todos"][1]["task"], "Go grocery shopping!");
    assert_eq!(snapshot["todos"][2]["task"], "Make dinner");

    // Completing everything selected by the predicate does not widen the
    // selection mid-write
    set_state
        .set(
            path!["todos", filter(|todo| todo["completed"] == false)],
            Update::merge([("completed", Some(json!(true)))]),
        )
        .unwrap();
    assert_eq!(completed(&state.snapshot()), vec![true, true, true]);

    set_state
        .set(
            path!["todos", filter_indexed(|_, index| index % 2 == 0), "completed"],
            false,
        )
        .unwrap();
    assert_eq!(completed(&state.snapshot()), vec![false, true, false]);
}

/// Replacing an array wholesale notifies a reader of the array itself;
/// writes through paths inside it do not.
#[test]
fn array_reference_rule() {
    let (state, set_state) = create_store(todos()).unwrap();
    let container_runs = Rc::new(Cell::new(0));
    let leaf_runs = Rc::new(Cell::new(0));

    let (s, runs) = (state.clone(), container_runs.clone());
    create_effect(move |_| {
        s.at("todos");
        runs.set(runs.get() + 1);
    });

    let (s, runs) = (state.clone(), leaf_runs.clone());
    create_effect(move |_| {
        s.at("todos").and_then(|todos| todos.at(0)).and_then(|todo| todo.get("completed"));
        runs.set(runs.get() + 1);
    });

    set_state.set(path!["todos", 0, "completed"], true).unwrap();
    set_state.set(path!["todos", 3], json!({"task": "Sleep", "completed": false})).unwrap();
    assert_eq!(container_runs.get(), 1);
    assert_eq!(leaf_runs.get(), 2);

    set_state
        .set(
            path!["todos"],
            Update::with(|todos| {
                let mut todos = todos.as_array().cloned().unwrap_or_default();
                todos.push(json!({"task": "Wake up", "completed": false}));
                Value::Array(todos)
            }),
        )
        .unwrap();
    assert_eq!(container_runs.get(), 2);
    assert_eq!(state.at("todos").map(|todos| todos.len()), Some(5));
}

/// Merging into a nested record notifies readers of the merged keys only.
#[test]
fn nested_merge_is_granular() {
    let (state, set_state) = create_store(json!({"user": {"name": "Ada", "age": 36}})).unwrap();
    let name_runs = Rc::new(Cell::new(0));
    let age_runs = Rc::new(Cell::new(0));

    for (field, runs) in [("name", name_runs.clone()), ("age", age_runs.clone())] {
        let s = state.clone();
        create_effect(move |_| {
            s.at("user").and_then(|user| user.get(field));
            runs.set(runs.get() + 1);
        });
    }

    set_state.set(path!["user"], json!({"age": 37})).unwrap();
    assert_eq!(name_runs.get(), 1);
    assert_eq!(age_runs.get(), 2);
}

/// Memos over store paths recompute once per write, and every write of one
/// `set` call lands in a single flush.
#[test]
fn multi_target_write_flushes_once() {
    let (state, set_state) = create_store(todos()).unwrap();
    let runs = Rc::new(Cell::new(0));

    let (s, r) = (state.clone(), runs.clone());
    let done = create_memo(move |_| {
        r.set(r.get() + 1);
        let todos = s.at("todos").expect("todos");
        (0..todos.len())
            .filter(|&i| todos.at(i).and_then(|todo| todo.get("completed")) == Some(json!(true)))
            .count()
    });
    assert_eq!(done.get(), 1);

    set_state.set(path!["todos", 0..=2, "completed"], true).unwrap();
    assert_eq!(done.get(), 3);
    assert_eq!(runs.get(), 2);

    batch(|| {
        set_state.set(path!["todos", 0, "completed"], false).unwrap();
        set_state.set(path!["todos", 1, "completed"], false).unwrap();
    })
    .unwrap();
    assert_eq!(done.get(), 1);
    assert_eq!(runs.get(), 3);
}

/// Reads return identical children until the parent value is replaced.
#[test]
fn lazy_children_are_identity_stable() {
    let (state, set_state) = create_store(todos()).unwrap();

    let todos = state.at("todos").unwrap();
    let first = todos.at(0).unwrap();
    assert!(first.ptr_eq(&state.at("todos").unwrap().at(0).unwrap()));
    assert!(todos.is_array());

    set_state.set(path!["todos", 0], json!({"task": "Rest"})).unwrap();
    // Merged in place
    assert!(first.ptr_eq(&todos.at(0).unwrap()));
    assert_eq!(first.get("completed"), Some(json!(false)));

    set_state.set(path!["todos", 0], json!("done")).unwrap();
    assert!(todos.at(0).is_none());
    assert_eq!(todos.get(0), Some(json!("done")));
}

/// Invalid paths fail before anything is written.
#[test]
fn invalid_paths_are_reported() {
    let (state, set_state) = create_store(todos()).unwrap();
    let before = state.snapshot();

    let cases = [
        path!["todos", "first"],
        path![0..=1, "completed"],
        path!["todos", 0, "task", "letters"],
        path!["todos", 7],
        path!["missing", "deeper"],
        path!["todos", filter(|_| true), 0],
        path!["todos", range(1, usize::MAX)],
        path!["todos", range(0, usize::MAX), "completed"],
    ];
    for path in cases {
        let err = set_state.set(path, json!(1)).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidPath { .. }), "{err}");
    }

    assert!(matches!(
        set_state.set(path!["todos", 0], Update::Remove),
        Err(ReactiveError::InvalidPath { .. })
    ));
    assert!(set_state.set(path![], json!([1, 2])).is_err());
    assert_eq!(state.snapshot(), before);
}

/// Predicates and updaters observe values without subscribing the caller.
#[test]
fn writes_from_effects_do_not_subscribe() {
    let (state, set_state) = create_store(json!({"count": 0, "log": []})).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (s, set, log) = (state.clone(), set_state.clone(), seen.clone());
    let effect = create_effect(move |_| {
        let count = s.get("count").unwrap_or(Value::Null);
        log.borrow_mut().push(count.clone());
        set.set(path!["log"], Update::with(move |log| {
            let mut log = log.as_array().cloned().unwrap_or_default();
            log.push(count.clone());
            Value::Array(log)
        }))
        .unwrap();
    });

    set_state.set(path!["count"], json!(1)).unwrap();
    assert_eq!(effect.run_count(), 2);
    assert_eq!(state.get("log"), Some(json!([0, 1])));
    assert_eq!(*seen.borrow(), vec![json!(0), json!(1)]);
}
