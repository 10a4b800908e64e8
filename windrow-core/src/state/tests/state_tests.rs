use super::*;

fn ns(start: i64, end: i64) -> StateNamespace {
    StateNamespace::window(TimeWindow::new(start, end))
}

/// Integer-sum combiner used across the combining-cell tests.
struct SumFn;

impl CombineFn<i64, i64, i64> for SumFn {
    fn create_accumulator(&self) -> i64 {
        0
    }

    fn add(&self, acc: &mut i64, input: &i64) {
        *acc += *input;
    }

    fn merge(&self, acc: &mut i64, other: i64) {
        *acc += other;
    }

    fn get_result(&self, acc: i64) -> i64 {
        acc
    }
}

// ── Value cells ───────────────────────────────────────────────────────────

#[test]
fn test_value_read_write_clear() {
    let mut store = StateStore::new();
    let count = ValueHandle::<i32>::new("count");
    let ns = ns(0, 10);

    assert_eq!(count.read(&store, &ns).unwrap(), None);
    assert!(count.is_empty(&store, &ns).unwrap());

    count.write(&mut store, &ns, &42).unwrap();
    assert_eq!(count.read(&store, &ns).unwrap(), Some(42));
    assert!(!count.is_empty(&store, &ns).unwrap());

    count.write(&mut store, &ns, &100).unwrap();
    assert_eq!(count.read(&store, &ns).unwrap(), Some(100));

    count.clear(&mut store, &ns).unwrap();
    assert_eq!(count.read(&store, &ns).unwrap(), None);
    assert!(count.is_empty(&store, &ns).unwrap());
}

#[test]
fn test_value_isolated_per_namespace() {
    let mut store = StateStore::new();
    let count = ValueHandle::<i32>::new("count");

    count.write(&mut store, &ns(0, 10), &1).unwrap();
    count.write(&mut store, &ns(10, 20), &2).unwrap();
    count.write(&mut store, &StateNamespace::Global, &3).unwrap();

    assert_eq!(count.read(&store, &ns(0, 10)).unwrap(), Some(1));
    assert_eq!(count.read(&store, &ns(10, 20)).unwrap(), Some(2));
    assert_eq!(count.read(&store, &StateNamespace::Global).unwrap(), Some(3));
}

#[test]
fn test_type_mismatch_is_an_error() {
    let mut store = StateStore::new();
    let as_int = ValueHandle::<i32>::new("cell");
    let as_string = ValueHandle::<String>::new("cell");
    let as_bag = BagHandle::<i32>::new("cell");
    let ns = ns(0, 10);

    as_int.write(&mut store, &ns, &7).unwrap();

    let err = as_string.read(&store, &ns).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::StateTypeMismatch { .. })
    ));

    let err = as_bag.add(&mut store, &ns, &1).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::StateTypeMismatch { .. })
    ));
}

// ── Bag cells ─────────────────────────────────────────────────────────────

#[test]
fn test_bag_preserves_insertion_order() {
    let mut store = StateStore::new();
    let events = BagHandle::<String>::new("events");
    let ns = ns(0, 10);

    assert!(events.is_empty(&store, &ns).unwrap());
    events.add(&mut store, &ns, &"b".to_string()).unwrap();
    events.add(&mut store, &ns, &"a".to_string()).unwrap();
    events.add(&mut store, &ns, &"b".to_string()).unwrap();

    assert_eq!(
        events.read(&store, &ns).unwrap(),
        vec!["b".to_string(), "a".to_string(), "b".to_string()]
    );

    events.clear(&mut store, &ns).unwrap();
    assert!(events.is_empty(&store, &ns).unwrap());
    assert_eq!(events.read(&store, &ns).unwrap(), Vec::<String>::new());
}

// ── Set cells ─────────────────────────────────────────────────────────────

#[test]
fn test_set_deduplicates() {
    let mut store = StateStore::new();
    let seen = SetHandle::<u32>::new("seen");
    let ns = ns(0, 10);

    seen.add(&mut store, &ns, &3).unwrap();
    seen.add(&mut store, &ns, &1).unwrap();
    seen.add(&mut store, &ns, &3).unwrap();

    assert!(seen.contains(&store, &ns, &1).unwrap());
    assert!(seen.contains(&store, &ns, &3).unwrap());
    assert!(!seen.contains(&store, &ns, &2).unwrap());
    assert_eq!(seen.read(&store, &ns).unwrap().len(), 2);

    seen.remove(&mut store, &ns, &3).unwrap();
    assert!(!seen.contains(&store, &ns, &3).unwrap());
}

// ── Combining cells ───────────────────────────────────────────────────────

#[test]
fn test_combining_accumulates() {
    let mut store = StateStore::new();
    let sum = CombiningHandle::<i64, i64, i64>::new("sum");
    let ns = ns(0, 10);

    // An absent cell reads as the output of a fresh accumulator.
    assert_eq!(sum.read(&store, &ns, &SumFn).unwrap(), 0);

    sum.add(&mut store, &ns, &SumFn, &5).unwrap();
    sum.add(&mut store, &ns, &SumFn, &7).unwrap();
    assert_eq!(sum.read(&store, &ns, &SumFn).unwrap(), 12);
    assert_eq!(sum.read_accumulator(&store, &ns).unwrap(), Some(12));
}

#[test]
fn test_combining_merge_across_namespaces() {
    let mut store = StateStore::new();
    let sum = CombiningHandle::<i64, i64, i64>::new("sum");
    let a = ns(0, 10);
    let b = ns(5, 15);
    let target = ns(0, 15);

    sum.add(&mut store, &a, &SumFn, &1).unwrap();
    sum.add(&mut store, &b, &SumFn, &2).unwrap();
    sum.add(&mut store, &target, &SumFn, &4).unwrap();

    sum.merge_namespaces(&mut store, &SumFn, &[a, b], &target)
        .unwrap();

    assert_eq!(sum.read(&store, &target, &SumFn).unwrap(), 7);
    assert!(sum.is_empty(&store, &a).unwrap());
    assert!(sum.is_empty(&store, &b).unwrap());
}

// ── Map cells ─────────────────────────────────────────────────────────────

#[test]
fn test_map_put_get_remove() {
    let mut store = StateStore::new();
    let metrics = MapHandle::<String, i32>::new("metrics");
    let ns = ns(0, 10);

    assert_eq!(metrics.get(&store, &ns, &"clicks".to_string()).unwrap(), None);

    metrics
        .put(&mut store, &ns, &"clicks".to_string(), &10)
        .unwrap();
    metrics
        .put(&mut store, &ns, &"views".to_string(), &100)
        .unwrap();
    assert_eq!(
        metrics.get(&store, &ns, &"clicks".to_string()).unwrap(),
        Some(10)
    );

    let removed = metrics.remove(&mut store, &ns, &"clicks".to_string()).unwrap();
    assert_eq!(removed, Some(10));
    assert_eq!(metrics.get(&store, &ns, &"clicks".to_string()).unwrap(), None);
    assert_eq!(metrics.entries(&store, &ns).unwrap().len(), 1);
}

// ── Namespace clearing ────────────────────────────────────────────────────

#[test]
fn test_clear_namespace_drops_all_cells_in_it() {
    let mut store = StateStore::new();
    let count = ValueHandle::<i32>::new("count");
    let events = BagHandle::<i32>::new("events");
    let w1 = ns(0, 10);
    let w2 = ns(10, 20);

    count.write(&mut store, &w1, &1).unwrap();
    events.add(&mut store, &w1, &1).unwrap();
    count.write(&mut store, &w2, &2).unwrap();

    store.clear_namespace(&w1);

    assert!(store.is_namespace_empty(&w1));
    assert_eq!(count.read(&store, &w1).unwrap(), None);
    assert_eq!(count.read(&store, &w2).unwrap(), Some(2));
}

#[test]
fn test_clear_window_also_drops_trigger_cells() {
    let mut store = StateStore::new();
    let count = ValueHandle::<u64>::new("count");
    let window = TimeWindow::new(0, 10);
    let user_ns = StateNamespace::window(window);
    let trigger_ns = StateNamespace::window_and_trigger(window, 0);

    count.write(&mut store, &user_ns, &1).unwrap();
    count.write(&mut store, &trigger_ns, &2).unwrap();

    store.clear_window(&window);

    assert!(store.is_namespace_empty(&user_ns));
    assert!(store.is_namespace_empty(&trigger_ns));
    assert!(store.is_empty());
}

// ── Snapshot / restore ────────────────────────────────────────────────────

#[test]
fn test_snapshot_restore_roundtrip() {
    let mut store = StateStore::new();
    let count = ValueHandle::<i32>::new("count");
    let events = BagHandle::<String>::new("events");

    count.write(&mut store, &ns(0, 10), &42).unwrap();
    events.add(&mut store, &ns(0, 10), &"e1".to_string()).unwrap();
    events.add(&mut store, &ns(10, 20), &"e2".to_string()).unwrap();

    let snapshot = store.snapshot().unwrap();

    let mut restored = StateStore::new();
    restored.restore(&snapshot).unwrap();
    assert_eq!(restored.len(), 3);
    assert_eq!(count.read(&restored, &ns(0, 10)).unwrap(), Some(42));
    assert_eq!(
        events.read(&restored, &ns(0, 10)).unwrap(),
        vec!["e1".to_string()]
    );
}

#[test]
fn test_backend_round_trips_per_key() {
    let mut backend = InMemoryStateBackend::new();
    let count = ValueHandle::<i32>::new("count");

    let mut store = backend.state_for(b"user-1").unwrap();
    assert!(store.is_empty());
    count.write(&mut store, &ns(0, 10), &7).unwrap();
    backend.persist(b"user-1", store.snapshot().unwrap()).unwrap();

    let restored = backend.state_for(b"user-1").unwrap();
    assert_eq!(count.read(&restored, &ns(0, 10)).unwrap(), Some(7));

    // Other keys are untouched.
    assert!(backend.state_for(b"user-2").unwrap().is_empty());
}

#[test]
fn test_snapshot_is_stable_without_mutation() {
    let mut store = StateStore::new();
    let count = ValueHandle::<i32>::new("count");
    for (i, window_start) in [0i64, 10, 20, 30].iter().enumerate() {
        count
            .write(&mut store, &ns(*window_start, window_start + 10), &(i as i32))
            .unwrap();
    }
    assert_eq!(store.snapshot().unwrap(), store.snapshot().unwrap());

    // And a restored store snapshots identically too.
    let snapshot = store.snapshot().unwrap();
    let mut restored = StateStore::new();
    restored.restore(&snapshot).unwrap();
    assert_eq!(restored.snapshot().unwrap(), snapshot);
}
