//! Per-kind observer behavior for every intercepted mutator.

use std::sync::Arc;

use parking_lot::Mutex;

use change_flow::{ObservableVec, ObserveRuntime};

type States = Arc<Mutex<Vec<Vec<i32>>>>;
type Events = Arc<Mutex<Vec<(i32, usize)>>>;

fn record_generic(runtime: &ObserveRuntime, vec: &ObservableVec<i32>) -> (States, States) {
    let news: States = Arc::new(Mutex::new(Vec::new()));
    let olds: States = Arc::new(Mutex::new(Vec::new()));
    let (n, o) = (news.clone(), olds.clone());
    runtime
        .observe(vec, move |new_state, old_state| {
            n.lock().push(new_state.to_vec());
            o.lock().push(old_state.to_vec());
            Ok(())
        })
        .unwrap();
    (news, olds)
}

fn record_create(runtime: &ObserveRuntime, vec: &ObservableVec<i32>) -> Events {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    runtime
        .observe_create(vec, move |item, index| {
            e.lock().push((*item, index));
            Ok(())
        })
        .unwrap();
    events
}

fn record_delete(runtime: &ObserveRuntime, vec: &ObservableVec<i32>) -> Events {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    runtime.observe_delete(vec, move |item, index| {
        e.lock().push((*item, index));
        Ok(())
    });
    events
}

// ----------------------------------------------------------------------
// Generic observers
// ----------------------------------------------------------------------

#[test]
fn generic_observer_is_called_when_bound() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2, 3]);
    let (news, olds) = record_generic(&runtime, &vec);

    assert_eq!(*news.lock(), vec![vec![0, 1, 2, 3]]);
    assert_eq!(*olds.lock(), vec![Vec::<i32>::new()]);
    runtime.unobserve_all();
}

#[test]
fn generic_observer_follows_every_mutator() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2, 3]);
    let (news, olds) = record_generic(&runtime, &vec);
    news.lock().clear();
    olds.lock().clear();

    vec.pop().unwrap();
    vec.remove(0).unwrap();
    vec.splice(0..2, vec![]).unwrap();
    vec.splice(0..0, vec![1, 2]).unwrap();
    vec.insert(0, 0).unwrap();
    vec.push(3).unwrap();
    vec.reverse().unwrap();
    vec.sort().unwrap();

    assert_eq!(
        *news.lock(),
        vec![
            vec![0, 1, 2],
            vec![1, 2],
            vec![],
            vec![1, 2],
            vec![0, 1, 2],
            vec![0, 1, 2, 3],
            vec![3, 2, 1, 0],
            vec![0, 1, 2, 3],
        ]
    );

    // Each call's old state is the previous call's new state.
    let olds = olds.lock();
    assert_eq!(olds[0], vec![0, 1, 2, 3]);
    let news = news.lock();
    for i in 1..news.len() {
        assert_eq!(olds[i], news[i - 1]);
    }
    runtime.unobserve_all();
}

#[test]
fn generic_observer_does_not_fire_for_no_op_mutators() {
    let runtime = ObserveRuntime::new();
    let vec: ObservableVec<i32> = ObservableVec::new();
    let (news, _) = record_generic(&runtime, &vec);
    news.lock().clear();

    vec.pop().unwrap();
    vec.truncate(5).unwrap();
    vec.splice(0..0, vec![]).unwrap();
    vec.extend(std::iter::empty()).unwrap();
    vec.reverse().unwrap();

    assert!(news.lock().is_empty());
    runtime.unobserve_all();
}

// ----------------------------------------------------------------------
// Create observers
// ----------------------------------------------------------------------

#[test]
fn create_observer_catches_up_once_per_existing_element() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![10, 20]);
    let creates = record_create(&runtime, &vec);
    let deletes = record_delete(&runtime, &vec);

    assert_eq!(*creates.lock(), vec![(10, 0), (20, 1)]);
    assert!(deletes.lock().is_empty());
    runtime.unobserve_all();
}

#[test]
fn create_observer_sees_push_insert_and_splice() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![10, 20]);
    let creates = record_create(&runtime, &vec);
    creates.lock().clear();

    vec.insert(0, 0).unwrap();
    assert_eq!(*creates.lock(), vec![(0, 0)]);
    creates.lock().clear();

    vec.push(3).unwrap();
    assert_eq!(*creates.lock(), vec![(3, 3)]);
    creates.lock().clear();

    // Replace two elements: creates arrive ascending.
    vec.splice(1..3, vec![1, 2]).unwrap();
    assert_eq!(*creates.lock(), vec![(1, 1), (2, 2)]);
    runtime.unobserve_all();
}

#[test]
fn create_observer_sees_full_reorders_ascending() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2, 3]);
    let creates = record_create(&runtime, &vec);
    creates.lock().clear();

    vec.reverse().unwrap();
    assert_eq!(*creates.lock(), vec![(3, 0), (2, 1), (1, 2), (0, 3)]);
    creates.lock().clear();

    vec.sort().unwrap();
    assert_eq!(*creates.lock(), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    runtime.unobserve_all();
}

#[test]
fn extend_fires_one_create_per_element() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0]);
    let creates = record_create(&runtime, &vec);
    creates.lock().clear();

    vec.extend([1, 2, 3]).unwrap();
    assert_eq!(*creates.lock(), vec![(1, 1), (2, 2), (3, 3)]);
    runtime.unobserve_all();
}

// ----------------------------------------------------------------------
// Delete observers
// ----------------------------------------------------------------------

#[test]
fn delete_observer_is_not_called_when_bound() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![1, 2, 3]);
    let deletes = record_delete(&runtime, &vec);
    assert!(deletes.lock().is_empty());
    runtime.unobserve_all();
}

#[test]
fn pop_reports_the_removed_tail_element() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![-1, 0, 7, 8, 3, 4]);
    let deletes = record_delete(&runtime, &vec);

    vec.pop().unwrap();
    assert_eq!(*deletes.lock(), vec![(4, 5)]);
    runtime.unobserve_all();
}

#[test]
fn remove_first_reports_index_zero() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2]);
    let deletes = record_delete(&runtime, &vec);

    assert_eq!(vec.remove(0).unwrap(), 0);
    assert_eq!(*deletes.lock(), vec![(0, 0)]);
    runtime.unobserve_all();
}

#[test]
fn splice_reports_deletions_in_reverse_order() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 7, 8, 3]);
    let deletes = record_delete(&runtime, &vec);
    let creates = record_create(&runtime, &vec);
    creates.lock().clear();

    vec.splice(1..3, vec![1, 2]).unwrap();
    assert_eq!(*deletes.lock(), vec![(8, 2), (7, 1)]);
    assert_eq!(*creates.lock(), vec![(1, 1), (2, 2)]);
    runtime.unobserve_all();
}

#[test]
fn full_reorders_delete_every_prior_index_descending() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![3, 2, 1, 0]);
    let deletes = record_delete(&runtime, &vec);

    vec.sort().unwrap();
    assert_eq!(*deletes.lock(), vec![(0, 3), (1, 2), (2, 1), (3, 0)]);
    runtime.unobserve_all();
}

#[test]
fn truncate_deletes_the_tail_descending() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2, 3]);
    let deletes = record_delete(&runtime, &vec);

    vec.truncate(2).unwrap();
    assert_eq!(*deletes.lock(), vec![(3, 3), (2, 2)]);
    deletes.lock().clear();

    vec.clear().unwrap();
    assert_eq!(*deletes.lock(), vec![(1, 1), (0, 0)]);
    runtime.unobserve_all();
}

// ----------------------------------------------------------------------
// Update observers
// ----------------------------------------------------------------------

#[test]
fn update_observer_is_not_called_when_bound() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![1]);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let u = updates.clone();
    runtime.observe_update(&vec, move |new, old, index| {
        u.lock().push((*new, *old, index));
        Ok(())
    });
    assert!(updates.lock().is_empty());
    runtime.unobserve_all();
}

#[test]
fn set_fires_update_with_old_and_new_values() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![1, 2]);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let u = updates.clone();
    runtime.observe_update(&vec, move |new, old, index| {
        u.lock().push((*new, *old, index));
        Ok(())
    });

    assert_eq!(vec.set(1, 9).unwrap(), 2);
    assert_eq!(*updates.lock(), vec![(9, 2, 1)]);
    runtime.unobserve_all();
}

#[test]
fn setting_an_equal_value_still_counts_as_an_update() {
    // `set` is an intercepted operation with exact semantics, not a diff;
    // replacing a value with an equal one is still the caller's update.
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![5]);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let u = updates.clone();
    runtime.observe_update(&vec, move |new, old, index| {
        u.lock().push((*new, *old, index));
        Ok(())
    });

    vec.set(0, 5).unwrap();
    assert_eq!(*updates.lock(), vec![(5, 5, 0)]);
    runtime.unobserve_all();
}

// ----------------------------------------------------------------------
// Scenarios from the public contract
// ----------------------------------------------------------------------

#[test]
fn scenario_push_onto_three_elements() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![0, 1, 2]);
    let creates = record_create(&runtime, &vec);
    let deletes = record_delete(&runtime, &vec);
    let updates = Arc::new(Mutex::new(0usize));
    {
        let u = updates.clone();
        runtime.observe_update(&vec, move |_, _, _| {
            *u.lock() += 1;
            Ok(())
        });
    }
    creates.lock().clear();

    vec.push(3).unwrap();
    assert_eq!(*creates.lock(), vec![(3, 3)]);
    assert!(deletes.lock().is_empty());
    assert_eq!(*updates.lock(), 0);
    runtime.unobserve_all();
}

#[test]
fn scenario_sort_one_two_zero() {
    let runtime = ObserveRuntime::new();
    let vec = ObservableVec::from_vec(vec![1, 2, 0]);
    let creates = record_create(&runtime, &vec);
    let deletes = record_delete(&runtime, &vec);
    creates.lock().clear();

    vec.sort().unwrap();
    assert_eq!(*deletes.lock(), vec![(0, 2), (2, 1), (1, 0)]);
    assert_eq!(*creates.lock(), vec![(0, 0), (1, 1), (2, 2)]);
    runtime.unobserve_all();
}
