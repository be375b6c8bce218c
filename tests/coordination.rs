//! End-to-end coordination properties
//!
//! These suites drive the public `Database` surface the way a real caller
//! would — mixed threads, caller-owned sessions, the view session, the
//! commit hook — and assert the ordering, propagation, pruning, and
//! initialization guarantees of the coordination layer.

mod common;

use common::TestDb;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;
use storeline::{Participation, RecordId};

#[test]
fn concurrent_writes_commit_in_one_total_order() {
    const THREADS: u64 = 4;
    const WRITES_PER_THREAD: u64 = 25;

    let t = TestDb::new();
    let hook_order: Arc<Mutex<Vec<RecordId>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&hook_order);
    t.db.set_on_change_committed(move |notification| {
        // One commit, one notification, no interleaving of effects.
        assert_eq!(notification.len(), 1);
        sink.lock().extend(notification.inserted.iter().copied());
    });

    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let handles: Vec<_> = (0..THREADS)
        .map(|thread_idx| {
            let db = t.db.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for k in 0..WRITES_PER_THREAD {
                    let committed = db.perform_write_sync(move |tx| {
                        tx.insert("Message", json!({"thread": thread_idx, "k": k}))
                    });
                    assert!(committed.is_some());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    t.flush();

    // Exactly N commits reached the writer.
    assert_eq!(t.db.metrics().commits, THREADS * WRITES_PER_THREAD);
    let order = hook_order.lock();
    assert_eq!(order.len(), (THREADS * WRITES_PER_THREAD) as usize);

    // Map each committed record back to its (thread, k) marker.
    let records: BTreeMap<RecordId, (u64, u64)> = t
        .db
        .perform_read_sync(|tx| {
            tx.all("Message")
                .into_iter()
                .map(|r| {
                    (
                        r.id,
                        (
                            r.payload["thread"].as_u64().unwrap(),
                            r.payload["k"].as_u64().unwrap(),
                        ),
                    )
                })
                .collect()
        })
        .unwrap();
    assert_eq!(records.len(), (THREADS * WRITES_PER_THREAD) as usize);

    // Within the single global order, each thread's submissions appear in
    // submission order.
    for thread_idx in 0..THREADS {
        let ks: Vec<u64> = order
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|(t, _)| *t == thread_idx)
            .map(|(_, k)| *k)
            .collect();
        assert_eq!(ks, (0..WRITES_PER_THREAD).collect::<Vec<_>>());
    }
}

#[test]
fn view_reflects_commit_before_hook_fires() {
    let t = TestDb::new();
    let view = t.db.view_session().unwrap();

    let observations: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observations);
    t.db.set_on_change_committed(move |notification| {
        // Every id the notification carries is already readable through
        // the view session when the hook runs.
        let all_visible = notification
            .inserted
            .iter()
            .all(|id| view.perform(|tx| tx.get(id)).is_some());
        sink.lock().push(all_visible);
    });

    for _ in 0..5 {
        t.db.perform_write_sync(|tx| {
            tx.insert("Message", json!({}));
        })
        .unwrap();
    }
    t.flush();

    let seen = observations.lock();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|v| *v));
}

#[test]
fn dropped_session_is_pruned_on_next_commit_cycle() {
    let t = TestDb::new();
    let session = t.db.private_session(Participation::Merged).unwrap();
    assert_eq!(t.db.metrics().registered_sessions, 1);

    // A live registration survives any number of commit cycles.
    for _ in 0..3 {
        t.db.perform_write_sync(|tx| {
            tx.insert("Message", json!({}));
        })
        .unwrap();
    }
    assert_eq!(t.db.metrics().registered_sessions, 1);

    // Dropping the owner does not remove the registration early...
    drop(session);
    assert_eq!(t.db.metrics().registered_sessions, 1);

    // ...the very next commit cycle does.
    t.db.perform_write_sync(|tx| {
        tx.insert("Message", json!({}));
    })
    .unwrap();
    assert_eq!(t.db.metrics().registered_sessions, 0);
}

#[test]
fn many_dropped_sessions_do_not_leak() {
    let t = TestDb::new();
    for _ in 0..50 {
        let s = t.db.private_session(Participation::Merged).unwrap();
        drop(s);
    }
    assert_eq!(t.db.metrics().registered_sessions, 50);
    t.db.perform_write_sync(|tx| {
        tx.insert("Message", json!({}));
    })
    .unwrap();
    assert_eq!(t.db.metrics().registered_sessions, 0);
}

#[test]
fn isolated_sessions_are_never_registered() {
    let t = TestDb::new();
    let _session = t.db.private_session(Participation::Isolated).unwrap();
    assert_eq!(t.db.metrics().registered_sessions, 0);
}

#[test]
fn concurrent_first_access_initializes_once() {
    const CALLERS: usize = 8;
    let t = TestDb::new();

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let db = t.db.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                match i % 3 {
                    0 => {
                        db.view_session().unwrap();
                    }
                    1 => {
                        db.perform_read_sync(|tx| tx.all("Message").len()).unwrap();
                    }
                    _ => {
                        db.perform_write_sync(|_| ()).unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(t.db.metrics().initializations, 1);
}

#[test]
fn concurrent_sessions_with_unrelated_edits_both_land() {
    let t = TestDb::new();
    let db = &t.db;

    // Seed the record session B will later update.
    let r2 = db
        .perform_write_sync(|tx| tx.insert("Message", json!({"name": "r2", "v": 0})))
        .unwrap();

    // B opens, stages an update to r2, and stays open.
    let b = db.private_session(Participation::Merged).unwrap();
    b.perform(|tx| {
        let mut rec = tx.get(&r2.id).unwrap();
        rec.payload["v"] = json!(1);
        tx.update(rec);
    });

    // A opens concurrently, inserts r1, and commits first.
    let a = db.private_session(Participation::Merged).unwrap();
    let r1 = a.perform(|tx| tx.insert("Message", json!({"name": "r1"})));
    db.save_session(&a);

    // B was merged with A's commit before committing its own change:
    // it sees r1 and still holds its staged update.
    assert!(b.perform(|tx| tx.get(&r1.id)).is_some());
    assert!(b.has_changes());

    // B's unrelated change still commits.
    db.save_session(&b);
    t.flush();

    let view = db.view_session().unwrap();
    assert_eq!(view.perform(|tx| tx.all("Message").len()), 2);
    assert_eq!(
        view.perform(|tx| tx.get(&r2.id)).unwrap().payload["v"],
        1
    );
    assert!(view.perform(|tx| tx.get(&r1.id)).is_some());
}

#[test]
fn registered_session_observes_commits_in_order() {
    let t = TestDb::new();
    let session = t.db.private_session(Participation::Merged).unwrap();

    let mut expected = Vec::new();
    for i in 0..5 {
        let rec = t
            .db
            .perform_write_sync(move |tx| tx.insert("Message", json!({"i": i})))
            .unwrap();
        expected.push(rec.id);
        // After each cycle the registered session already sees the commit.
        assert!(session.perform(|tx| tx.get(&rec.id)).is_some());
    }
    assert_eq!(
        session.perform(|tx| tx.all("Message").len()),
        expected.len()
    );
}

#[test]
#[should_panic(expected = "read-only session cannot commit")]
fn committing_through_the_view_session_panics() {
    let t = TestDb::new();
    let view = t.db.view_session().unwrap();
    let _ = view.commit();
}

#[test]
#[should_panic(expected = "read-only session cannot be mutated")]
fn mutating_through_the_view_session_panics() {
    let t = TestDb::new();
    let view = t.db.view_session().unwrap();
    view.perform(|tx| {
        tx.insert("Message", json!({}));
    });
}

#[test]
fn fire_and_forget_write_lands() {
    let t = TestDb::new();
    t.db.perform_write(|tx| {
        tx.insert("Message", json!({"via": "async"}));
    });
    // From a non-coordinating thread the fire-and-forget path executes
    // before returning, so the write is already visible.
    assert_eq!(
        t.db.perform_read_sync(|tx| tx.all("Message").len()),
        Some(1)
    );
}
