//! Stress tests for LiteDoc.
//!
//! These helpers drive a database under heavy load and concurrent access
//! and report throughput plus failure counts.

use litedoc_bson::{doc, Document, Expr, Value};
use litedoc_core::{CoreError, Database, Query};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const COLLECTION: &str = "stress";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of the binary payload per document.
    pub document_size: usize,
    /// Number of distinct `_id`s.
    pub document_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            document_size: 256,
            document_count: 1_000,
        }
    }
}

fn payload(id: usize, config: &StressConfig) -> Document {
    doc! {
        "_id" => id as i64,
        "group" => (id % 16) as i32,
        "data" => vec![0xABu8; config.document_size],
    }
}

fn id_of(i: usize, config: &StressConfig) -> Value {
    Value::Int64((i % config.document_count) as i64)
}

fn populate(db: &Database, config: &StressConfig) {
    db.transaction(|tx| {
        for i in 0..config.document_count {
            tx.upsert(COLLECTION, payload(i, config))?;
        }
        Ok(())
    })
    .expect("Failed to populate collection");
}

/// Run a sequential write stress test.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let document = payload(i % config.document_count, config);
        match db.upsert(COLLECTION, document) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test.
pub fn stress_sequential_reads(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match db.find_by_id(COLLECTION, &id_of(i, config)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed read/write/delete stress test.
pub fn stress_mixed_operations(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let result = match i % 3 {
            0 => db
                .upsert(COLLECTION, payload(i % config.document_count, config))
                .map(|_| ()),
            1 => db.find_by_id(COLLECTION, &id_of(i, config)).map(|_| ()),
            _ => db.delete(COLLECTION, &id_of(i, config)).map(|_| ()),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent indexed queries against a populated collection.
pub fn stress_concurrent_reads(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let _ = db.ensure_index(COLLECTION, "group", "$.group", false);
    populate(&db, config);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let group = ((t + i) % 16) as i32;
                    match db.count(COLLECTION, &Query::eq(Expr::field("group"), group)) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run writers on separate collections and readers on all of them at once.
///
/// Every thread owns collection `stress_<t>` and also counts the next
/// thread's collection, so shared and exclusive locks interleave.
pub fn stress_concurrent_writers(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let threads = config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                let own = format!("{COLLECTION}_{t}");
                let neighbour = format!("{COLLECTION}_{}", (t + 1) % threads);
                for i in 0..ops_per_thread {
                    let result = if i % 4 == 3 {
                        db.count(&neighbour, &Query::all()).map(|_| ())
                    } else {
                        db.upsert(&own, payload(i % config.document_count, &config))
                            .map(|_| ())
                    };
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a transaction rollback stress test.
pub fn stress_transaction_aborts(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        // Every other transaction fails on purpose.
        let should_fail = i % 2 == 0;

        let result = db.transaction(|tx| {
            tx.upsert(COLLECTION, payload(i % config.document_count, config))?;
            if should_fail {
                Err(CoreError::invalid_operation("intentional"))
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a large transaction stress test.
pub fn stress_large_transactions(db: &Database, config: &StressConfig) -> StressTestResult {
    let batch_size = 100;

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for batch in 0..(config.operations / batch_size) {
        let result = db.transaction(|tx| {
            for i in 0..batch_size {
                let idx = (batch * batch_size + i) % config.document_count;
                tx.upsert(COLLECTION, payload(idx, config))?;
            }
            Ok(())
        });

        match result {
            Ok(()) => successful += batch_size,
            Err(_) => failed += batch_size,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Database {
        Database::open_in_memory().expect("Failed to create database")
    }

    fn small() -> StressConfig {
        StressConfig {
            operations: 600,
            threads: 4,
            document_size: 64,
            document_count: 100,
        }
    }

    #[test]
    fn test_sequential_writes() {
        let db = create_test_db();
        let result = stress_sequential_writes(&db, &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 600);
        assert_eq!(db.count(COLLECTION, &Query::all()).unwrap(), 100);
    }

    #[test]
    fn test_sequential_reads() {
        let db = create_test_db();
        let result = stress_sequential_reads(&db, &small());
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_mixed_operations() {
        let db = create_test_db();
        let result = stress_mixed_operations(&db, &small());
        assert_eq!(result.failed_ops, 0);
        assert!(db.verify().unwrap().is_clean());
    }

    #[test]
    fn test_concurrent_reads() {
        let db = Arc::new(create_test_db());
        let result = stress_concurrent_reads(db, &small());
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_concurrent_writers() {
        let db = Arc::new(create_test_db());
        let result = stress_concurrent_writers(Arc::clone(&db), &small());
        assert_eq!(result.failed_ops, 0);
        assert!(db.verify().unwrap().is_clean());
    }

    #[test]
    fn test_transaction_aborts() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 100,
            ..small()
        };
        let result = stress_transaction_aborts(&db, &config);
        assert_eq!(result.successful_ops, 50);
        assert_eq!(result.failed_ops, 50);
        assert_eq!(db.count(COLLECTION, &Query::all()).unwrap(), 50);
    }

    #[test]
    fn test_large_transactions() {
        let db = create_test_db();
        let result = stress_large_transactions(&db, &small());
        assert_eq!(result.failed_ops, 0);
    }
}
