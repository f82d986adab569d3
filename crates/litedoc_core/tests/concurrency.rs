//! Transactions on several threads sharing one handle.

use litedoc_bson::{doc, Value};
use litedoc_core::{Config, CoreError, Database, Query, TransactionState};
use litedoc_storage::InMemoryBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn database(lock_timeout: Duration) -> Arc<Database> {
    let config = Config::default().lock_timeout(lock_timeout);
    Arc::new(
        Database::open_with_backends(
            config,
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
        )
        .unwrap(),
    )
}

#[test]
fn readers_never_see_half_a_transaction() {
    let db = database(Duration::from_secs(10));
    db.insert("c", doc! { "_id" => 0 }).unwrap();

    let mut writer = db.begin().unwrap();
    for i in 1..=10 {
        writer.insert("c", doc! { "_id" => i }).unwrap();
    }

    let committed = Arc::new(AtomicBool::new(false));
    let reader = {
        let db = Arc::clone(&db);
        let committed = Arc::clone(&committed);
        thread::spawn(move || {
            let count = db.count("c", &Query::all()).unwrap();
            (count, committed.load(Ordering::SeqCst))
        })
    };

    thread::sleep(Duration::from_millis(50));
    committed.store(true, Ordering::SeqCst);
    writer.commit().unwrap();

    let (count, after_commit) = reader.join().unwrap();
    assert!(after_commit);
    assert_eq!(count, 11);
}

#[test]
fn lock_timeout_keeps_the_waiter_active() {
    let db = database(Duration::from_millis(50));
    let mut holder = db.begin().unwrap();
    holder.insert("c", doc! { "_id" => 1 }).unwrap();

    let waiter = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            let mut tx = db.begin().unwrap();
            let err = tx.insert("c", doc! { "_id" => 2 }).unwrap_err();
            let timed_out = matches!(err, CoreError::LockTimeout { .. });
            (timed_out, tx.state(), tx)
        })
    };
    let (timed_out, state, mut tx) = waiter.join().unwrap();
    assert!(timed_out);
    assert_eq!(state, TransactionState::Active);

    holder.commit().unwrap();
    tx.insert("c", doc! { "_id" => 2 }).unwrap();
    tx.commit().unwrap();
    assert_eq!(db.count("c", &Query::all()).unwrap(), 2);
}

#[test]
fn writers_on_one_collection_serialize() {
    let db = database(Duration::from_secs(30));
    let threads = 4;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let id = (t * per_thread + i) as i32;
                    db.insert("shared", doc! { "_id" => id, "t" => t as i32 }).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let all = db.find("shared", &Query::all()).unwrap();
    assert_eq!(all.len(), threads * per_thread);
    let ids: Vec<i64> = all.iter().filter_map(|d| d.id().and_then(Value::as_i64)).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn writers_on_different_collections_run_side_by_side() {
    let db = database(Duration::from_millis(200));
    let mut first = db.begin().unwrap();
    first.insert("left", doc! { "_id" => 1 }).unwrap();

    let other = {
        let db = Arc::clone(&db);
        thread::spawn(move || db.insert("right", doc! { "_id" => 1 }))
    };
    assert!(other.join().unwrap().is_ok());
    first.commit().unwrap();

    let mut names = db.collection_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["left".to_string(), "right".to_string()]);
}

#[test]
fn checkpoint_runs_beside_an_active_transaction() {
    let db = database(Duration::from_secs(10));
    db.insert("c", doc! { "_id" => 1 }).unwrap();
    let mut open = db.begin().unwrap();
    open.insert("c", doc! { "_id" => 2 }).unwrap();

    db.checkpoint().unwrap();
    open.rollback().unwrap();
    assert_eq!(db.count("c", &Query::all()).unwrap(), 1);
    assert_eq!(db.manager().active_count(), 0);
}
