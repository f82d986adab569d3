//! Document, index and page accounting scenarios through the public API.

use litedoc_bson::{doc, Document, Expr, Value};
use litedoc_core::{
    AutoId, Collation, Config, CoreError, Database, ErrorCode, PageType, Query, Remedy,
};
use litedoc_storage::InMemoryBackend;

fn binary_doc(len: usize) -> Document {
    doc! { "_id" => 1, "d" => vec![0xA5u8; len] }
}

fn data_free_bytes(db: &Database, collection: &str) -> Vec<usize> {
    let mut free: Vec<usize> = db
        .pages()
        .unwrap()
        .into_iter()
        .filter(|p| p.page_type == PageType::Data && p.collection.as_deref() == Some(collection))
        .map(|p| p.free_bytes)
        .collect();
    free.sort_unstable();
    free
}

fn ids(documents: &[Document]) -> Vec<Value> {
    documents.iter().map(|d| d.id().cloned().unwrap()).collect()
}

#[test]
fn free_bytes_follow_document_growth_and_shrink() {
    let db = Database::open_in_memory().unwrap();

    db.insert("col", binary_doc(300)).unwrap();
    assert_eq!(data_free_bytes(&db, "col"), vec![7828]);

    assert!(db.update("col", binary_doc(2000)).unwrap());
    assert_eq!(data_free_bytes(&db, "col"), vec![6128]);

    assert!(db.update("col", binary_doc(20000)).unwrap());
    assert_eq!(data_free_bytes(&db, "col"), vec![0, 0, 4428]);

    assert!(db.update("col", binary_doc(10000)).unwrap());
    assert_eq!(data_free_bytes(&db, "col"), vec![0, 6278]);
    let empty = db
        .pages()
        .unwrap()
        .into_iter()
        .filter(|p| p.page_type == PageType::Empty)
        .count();
    assert_eq!(empty, 1);

    let stored = db.find_by_id("col", &Value::Int32(1)).unwrap().unwrap();
    assert_eq!(stored, binary_doc(10000));
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn multikey_index_has_one_entry_per_element() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.ensure_index("posts", "tags", "$.tags[*]", false).unwrap());
    let tags: Vec<Value> = ["a", "b", "c"].into_iter().map(Value::from).collect();
    db.insert("posts", doc! { "_id" => 1, "tags" => tags }).unwrap();

    let tag_index = |db: &Database| {
        db.indexes("posts")
            .unwrap()
            .into_iter()
            .find(|i| i.name == "tags")
            .unwrap()
    };
    assert_eq!(tag_index(&db).key_count, 3);

    db.delete("posts", &Value::Int32(1)).unwrap();
    assert_eq!(tag_index(&db).key_count, 0);
}

#[test]
fn any_query_returns_each_document_once() {
    let db = Database::open_in_memory().unwrap();
    db.ensure_index("posts", "tags", "$.tags[*]", false).unwrap();
    let tagged = |id: i32, tags: &[&str]| {
        let tags: Vec<Value> = tags.iter().map(|t| Value::from(*t)).collect();
        doc! { "_id" => id, "tags" => tags }
    };
    db.insert_many(
        "posts",
        vec![
            tagged(1, &["x", "y", "z"]),
            tagged(2, &["y"]),
            tagged(3, &["a"]),
        ],
    )
    .unwrap();

    let expr = Expr::parse("$.tags[*]").unwrap();
    let query = Query::gte(expr.clone(), "x").any();
    let found = db.find("posts", &query).unwrap();
    assert_eq!(ids(&found), vec![Value::Int32(1), Value::Int32(2)]);
    assert_eq!(db.count("posts", &query).unwrap(), 2);

    let every = Query::gte(expr, "x").every();
    assert_eq!(db.count("posts", &every).unwrap(), 2);
}

#[test]
fn ensure_index_twice_returns_false() {
    let db = Database::open_in_memory().unwrap();
    db.insert("people", doc! { "_id" => 1, "name" => "ana" }).unwrap();
    assert!(db.ensure_index("people", "name", "$.name", false).unwrap());
    assert!(!db.ensure_index("people", "name", "$.name", false).unwrap());

    let err = db.ensure_index("people", "name", "$.other", false).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexAlreadyExists);
    let names: Vec<String> = db.indexes("people").unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["_id".to_string(), "name".to_string()]);
}

#[test]
fn unique_violation_leaves_reads_unchanged() {
    let db = Database::open_in_memory().unwrap();
    db.ensure_index("users", "email", "$.email", true).unwrap();
    db.insert("users", doc! { "_id" => 1, "email" => "a@x" }).unwrap();
    db.insert("users", doc! { "_id" => 2, "email" => "b@x" }).unwrap();

    let snapshot = |db: &Database| {
        (
            db.find("users", &Query::all()).unwrap(),
            db.find("users", &Query::eq(Expr::field("email"), "b@x")).unwrap(),
            db.indexes("users").unwrap(),
        )
    };
    let before = snapshot(&db);

    let mut tx = db.begin().unwrap();
    let err = tx
        .insert("users", doc! { "_id" => 3, "email" => "a@x" })
        .unwrap_err();
    assert!(matches!(err, CoreError::IndexDuplicateKey { .. }));
    assert!(tx.is_active());
    let err = tx
        .update("users", doc! { "_id" => 2, "email" => "a@x" })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexDuplicateKey);
    tx.insert("users", doc! { "_id" => 4, "email" => "d@x" }).unwrap();
    tx.commit().unwrap();

    let after = snapshot(&db);
    assert_eq!(after.0.len(), 3);
    assert_eq!(before.1, after.1);
    assert!(db.find_by_id("users", &Value::Int32(3)).unwrap().is_none());
}

#[test]
fn sequence_continues_after_explicit_id() {
    let db = Database::open_in_memory().unwrap();
    db.create_collection("numbers", AutoId::Int32).unwrap();
    db.insert("numbers", doc! { "_id" => 100 }).unwrap();
    assert_eq!(db.insert("numbers", doc! {}).unwrap(), Value::Int32(101));
    assert_eq!(db.insert("numbers", doc! {}).unwrap(), Value::Int32(102));

    let all = db.find("numbers", &Query::all()).unwrap();
    assert_eq!(
        ids(&all),
        vec![Value::Int32(100), Value::Int32(101), Value::Int32(102)]
    );
    let rows = db.sys_sequences().unwrap();
    assert_eq!(rows[0].get("collection"), Some(&Value::from("numbers")));
    assert_eq!(rows[0].get("value"), Some(&Value::Int64(102)));
}

#[test]
fn case_insensitive_collation_drives_index_lookups() {
    let config = Config::default().collation(Collation::parse("en-US/IgnoreCase").unwrap());
    let db = Database::open_with_backends(
        config,
        Box::new(InMemoryBackend::new()),
        Box::new(InMemoryBackend::new()),
    )
    .unwrap();
    assert_eq!(db.collation().compare("abc", "ABC"), std::cmp::Ordering::Equal);
    assert_ne!(
        Collation::binary().compare("abc", "ABC"),
        std::cmp::Ordering::Equal
    );

    db.ensure_index("words", "w", "$.w", true).unwrap();
    db.insert("words", doc! { "_id" => 1, "w" => "Hello" }).unwrap();
    let hit = db
        .find_one("words", &Query::eq(Expr::field("w"), "HELLO"))
        .unwrap();
    assert!(hit.is_some());
    let dup = db.insert("words", doc! { "_id" => 2, "w" => "hello" });
    assert!(matches!(dup, Err(CoreError::IndexDuplicateKey { .. })));
}

#[test]
fn ordering_skip_and_limit() {
    let db = Database::open_in_memory().unwrap();
    db.ensure_index("nums", "n", "$.n", false).unwrap();
    db.insert_many("nums", (1..=10).map(|i| doc! { "_id" => i, "n" => i % 4 }))
        .unwrap();

    let query = Query::gte(Expr::field("n"), 2).descending().skip(1).limit(3);
    let found = db.find("nums", &query).unwrap();
    assert_eq!(found.len(), 3);
    let values: Vec<i64> = found
        .iter()
        .map(|d| d.get("n").and_then(Value::as_i64).unwrap())
        .collect();
    assert!(values.windows(2).all(|w| w[0] >= w[1]));

    assert_eq!(db.min("nums", &Expr::field("n")).unwrap(), Some(Value::Int32(0)));
    assert_eq!(db.max("nums", &Expr::field("n")).unwrap(), Some(Value::Int32(3)));
    assert!(db.exists("nums", &Query::eq(Expr::field("n"), 3)).unwrap());
    assert_eq!(db.delete_many("nums", &Query::eq(Expr::field("n"), 0)).unwrap(), 2);
    assert_eq!(db.count("nums", &Query::all()).unwrap(), 8);
}

#[test]
fn collection_management() {
    let db = Database::open_in_memory().unwrap();
    db.insert("a", doc! { "_id" => 1 }).unwrap();
    assert!(db.rename_collection("a", "b").unwrap());
    assert!(!db.rename_collection("missing", "c").unwrap());
    assert!(!db.collection_exists("a").unwrap());
    assert!(db.find_by_id("b", &Value::Int32(1)).unwrap().is_some());

    db.insert("c", doc! { "_id" => 1 }).unwrap();
    let err = db.rename_collection("b", "c").unwrap_err();
    assert_eq!(err.code(), ErrorCode::CollectionAlreadyExists);

    assert!(db.drop_collection("b").unwrap());
    assert!(!db.drop_collection("b").unwrap());
    assert_eq!(db.collection_names().unwrap(), vec!["c".to_string()]);

    let err = db.drop_index("c", "_id").unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexDropId);
    assert!(!db.drop_index("c", "nothing").unwrap());
}

#[test]
fn upsert_reports_insertions() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.upsert("c", doc! { "_id" => "k", "v" => 1 }).unwrap());
    assert!(!db.upsert("c", doc! { "_id" => "k", "v" => 2 }).unwrap());
    let stored = db.find_by_id("c", &Value::from("k")).unwrap().unwrap();
    assert_eq!(stored.get("v"), Some(&Value::Int32(2)));
    assert!(!db.update("c", doc! { "_id" => "other" }).unwrap());
}

#[test]
fn invalid_ids_are_rejected() {
    let db = Database::open_in_memory().unwrap();
    let err = db.insert("c", doc! { "_id" => Value::Null }).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidIndexKey);
    let err = db
        .insert("c", doc! { "_id" => vec![Value::Int32(1)] })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidIndexKey);
}

#[test]
fn clean_database_needs_no_remedy() {
    let db = Database::open_in_memory().unwrap();
    db.insert_many("c", (0..50).map(|i| doc! { "_id" => i, "pad" => vec![0u8; 500] }))
        .unwrap();
    let report = db.verify().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.remedy(), Remedy::None);
    assert_eq!(report.documents_checked, 50);
}
