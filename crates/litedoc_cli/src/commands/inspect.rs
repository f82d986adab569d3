//! Inspect command implementation.

use super::{open_existing, print_json, CliError, Format};
use litedoc_core::{Database, PageInfo, Query};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Data file size in bytes.
    pub data_size: u64,
    /// Log file size in bytes, after the replay done on open.
    pub log_size: u64,
    /// Last commit sequence.
    pub last_sequence: u64,
    /// Stored user version.
    pub user_version: i32,
    /// Transactions replayed while opening.
    pub replayed_transactions: usize,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
    /// Page count by page type.
    pub page_types: BTreeMap<String, usize>,
    /// Every page (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageRow>>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub documents: usize,
    /// Secondary and primary indexes.
    pub indexes: Vec<IndexStats>,
}

/// One index of a collection.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// Key expression.
    pub expression: String,
    /// Unique flag.
    pub unique: bool,
    /// Number of keys.
    pub keys: usize,
}

/// One page of the data file.
#[derive(Debug, Serialize)]
pub struct PageRow {
    /// Page number.
    pub page_id: u32,
    /// Page type name.
    pub page_type: String,
    /// Items stored on the page.
    pub items: u8,
    /// Unused bytes.
    pub free_bytes: usize,
    /// Owning collection, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl From<PageInfo> for PageRow {
    fn from(info: PageInfo) -> Self {
        Self {
            page_id: info.page_id,
            page_type: info.page_type.name().to_string(),
            items: info.items_count,
            free_bytes: info.free_bytes,
            collection: info.collection,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, show_pages: bool, format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let result = inspect(&db, path, show_pages)?;

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Gathers the inspection result from an open database.
pub fn inspect(db: &Database, path: &Path, show_pages: bool) -> Result<InspectResult, CliError> {
    let mut collections = Vec::new();
    for name in db.collection_names()? {
        let documents = db.count(&name, &Query::all())?;
        let indexes = db
            .indexes(&name)?
            .into_iter()
            .map(|index| IndexStats {
                name: index.name,
                expression: index.expression,
                unique: index.unique,
                keys: index.key_count,
            })
            .collect();
        collections.push(CollectionStats {
            name,
            documents,
            indexes,
        });
    }

    let pages = db.pages()?;
    let mut page_types = BTreeMap::new();
    for page in &pages {
        *page_types.entry(page.page_type.name().to_string()).or_insert(0) += 1;
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        data_size: db.data_size()?,
        log_size: db.log_size()?,
        last_sequence: db.last_sequence().0,
        user_version: db.user_version()?,
        replayed_transactions: db.open_report().replayed_transactions,
        collections,
        page_types,
        pages: show_pages.then(|| pages.into_iter().map(PageRow::from).collect()),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!("  Data file: {} bytes", result.data_size);
    println!("  Log file: {} bytes", result.log_size);
    println!("  Last sequence: {}", result.last_sequence);
    println!("  User version: {}", result.user_version);
    if result.replayed_transactions > 0 {
        println!("  Replayed on open: {} transaction(s)", result.replayed_transactions);
    }

    println!();
    println!("Collections: {}", result.collections.len());
    for collection in &result.collections {
        println!("  {} ({} documents)", collection.name, collection.documents);
        for index in &collection.indexes {
            println!(
                "    {:<16} {:<28} {:>8} keys{}",
                index.name,
                index.expression,
                index.keys,
                if index.unique { "  unique" } else { "" }
            );
        }
    }

    println!();
    println!("Pages:");
    for (page_type, count) in &result.page_types {
        println!("  {page_type:<12} {count}");
    }

    if let Some(pages) = &result.pages {
        println!();
        println!("{:>8}  {:<12} {:>5} {:>6}  collection", "page", "type", "items", "free");
        for page in pages {
            println!(
                "{:>8}  {:<12} {:>5} {:>6}  {}",
                page.page_id,
                page.page_type,
                page.items,
                page.free_bytes,
                page.collection.as_deref().unwrap_or("-")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litedoc_bson::doc;

    #[test]
    fn inspect_counts_collections_and_pages() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_index("people", "name", "$.name", false).unwrap();
        db.insert("people", doc! { "_id" => 1, "name" => "Ana" }).unwrap();
        db.insert("people", doc! { "_id" => 2, "name" => "Rui" }).unwrap();
        db.insert("orders", doc! { "_id" => 1 }).unwrap();

        let result = inspect(&db, Path::new("memory"), true).unwrap();
        assert_eq!(result.collections.len(), 2);

        let people = result.collections.iter().find(|c| c.name == "people").unwrap();
        assert_eq!(people.documents, 2);
        let name = people.indexes.iter().find(|i| i.name == "name").unwrap();
        assert_eq!(name.keys, 2);

        assert_eq!(result.page_types.get("header"), Some(&1));
        assert_eq!(result.page_types.get("collection"), Some(&2));
        let total: usize = result.page_types.values().sum();
        assert_eq!(result.pages.as_ref().map(Vec::len), Some(total));
    }

    #[test]
    fn inspect_serializes_to_json() {
        let db = Database::open_in_memory().unwrap();
        db.insert("people", doc! { "_id" => 1 }).unwrap();

        let result = inspect(&db, Path::new("memory"), false).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["collections"][0]["name"], "people");
        assert!(json.get("pages").is_none());
    }
}
