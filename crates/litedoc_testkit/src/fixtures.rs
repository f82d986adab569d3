//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use litedoc_core::{Config, Database};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new directory-backed test database.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a directory-backed test database with custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join("db"), config)
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("db"))
    }

    /// Closes the handle and opens the same directory again.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which cannot be reopened.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        let temp_dir = temp_dir.expect("In-memory databases cannot be reopened");
        let config = db.config().clone();
        db.close().expect("Failed to close database");
        drop(db);
        let db = Database::open_with_config(&temp_dir.path().join("db"), config)
            .expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use litedoc_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         db.insert("test", doc! { "_id" => 1 }).unwrap();
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary directory-backed database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use litedoc_bson::{doc, Value};

    /// A database whose `test` collection holds `count` documents with
    /// `_id` 0..count, a numeric `n` field and a `tags` array.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .db
            .insert_many("test", (0..count).map(numbered))
            .expect("Failed to insert documents");
        test_db
    }

    /// Like [`populated_database`], with indexes on `n` and `tags[*]`.
    pub fn indexed_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .db
            .ensure_index("test", "n", "$.n", false)
            .expect("Failed to create index");
        test_db
            .db
            .ensure_index("test", "tags", "$.tags[*]", false)
            .expect("Failed to create index");
        test_db
            .db
            .insert_many("test", (0..count).map(numbered))
            .expect("Failed to insert documents");
        test_db
    }

    /// Creates `collection_count` collections holding one document each.
    pub fn multi_collection_database(collection_count: usize) -> (TestDatabase, Vec<String>) {
        let test_db = TestDatabase::memory();
        let mut names = Vec::with_capacity(collection_count);
        for i in 0..collection_count {
            let name = format!("collection_{i}");
            test_db
                .db
                .insert(&name, doc! { "_id" => 1, "collection" => i as i64 })
                .expect("Failed to insert document");
            names.push(name);
        }
        (test_db, names)
    }

    fn numbered(i: usize) -> litedoc_bson::Document {
        let i = i as i64;
        let tags: Vec<Value> = vec![Value::from(format!("t{}", i % 3)), Value::from("all")];
        doc! { "_id" => i, "n" => i % 10, "tags" => tags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litedoc_bson::{doc, Value};
    use litedoc_core::Query;

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert!(test_db.is_open());
    }

    #[test]
    fn test_with_temp_db() {
        with_temp_db(|db| {
            db.insert("test", doc! { "_id" => 1 }).unwrap();
            assert_eq!(db.count("test", &Query::all()).unwrap(), 1);
        });
    }

    #[test]
    fn test_file_database_reopens() {
        let test_db = TestDatabase::file();
        test_db.insert("test", doc! { "_id" => "x" }).unwrap();
        let test_db = test_db.reopen();
        assert!(test_db
            .find_by_id("test", &Value::from("x"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::indexed_database(30);
        assert_eq!(test_db.count("test", &Query::all()).unwrap(), 30);
        let tags = test_db
            .indexes("test")
            .unwrap()
            .into_iter()
            .find(|i| i.name == "tags")
            .unwrap();
        assert_eq!(tags.key_count, 60);
    }

    #[test]
    fn test_multi_collection_scenario() {
        let (test_db, names) = scenarios::multi_collection_database(5);
        assert_eq!(test_db.collection_names().unwrap(), names);
    }
}
