//! Page listing and the verification pass.
//!
//! Verification reads committed pages only and never stops at the first
//! failure: every problem is recorded in a [`RecoveryReport`] so the caller
//! can choose between dropping damaged documents and rebuilding the file.

use crate::collation::Collation;
use crate::collection::{definition_from_entry, AutoId};
use crate::data;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSet;
use crate::page::{HeaderInfo, Page, PageType, FREE_LIST_SLOTS, NO_PAGE};
use crate::recovery::RecoveryReport;
use crate::store::PageStore;
use crate::transaction::CommittedPages;
use crate::types::PageAddress;
use litedoc_bson::decode_document;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Summary of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Page id.
    pub page_id: u32,
    /// Page type.
    pub page_type: PageType,
    /// Bytes still available for new blocks and slots.
    pub free_bytes: usize,
    /// Used slots.
    pub items_count: u8,
    /// Owning collection, for collection and data pages.
    pub collection: Option<String>,
}

impl fmt::Display for PageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6} {:<10} free={:<5} items={:<3}",
            self.page_id, self.page_type, self.free_bytes, self.items_count
        )?;
        if let Some(collection) = &self.collection {
            write!(f, " {collection}")?;
        }
        Ok(())
    }
}

fn owners(header: &HeaderInfo) -> BTreeMap<u32, String> {
    header
        .collections
        .iter()
        .map(|(name, &page_id)| (page_id, name.clone()))
        .collect()
}

fn describe(page: &Page, owners: &BTreeMap<u32, String>) -> CoreResult<PageInfo> {
    let page_type = page.page_type()?;
    let collection = match page_type {
        PageType::Data => owners.get(&page.col_id()).cloned(),
        PageType::Collection => owners.get(&page.page_id()).cloned(),
        _ => None,
    };
    Ok(PageInfo {
        page_id: page.page_id(),
        page_type,
        free_bytes: page.free_bytes(),
        items_count: page.items_count(),
        collection,
    })
}

/// Describes one committed page.
pub(crate) fn page_info(store: &PageStore, page_id: u32) -> CoreResult<PageInfo> {
    if page_id > store.last_page_id() {
        return Err(CoreError::invalid_operation(format!(
            "page {page_id} is past the last page {}",
            store.last_page_id()
        )));
    }
    describe(&*store.read_page(page_id)?, &owners(&store.header()))
}

/// Describes every committed page.
pub(crate) fn pages(store: &PageStore) -> CoreResult<Vec<PageInfo>> {
    let owners = owners(&store.header());
    (0..=store.last_page_id())
        .map(|page_id| describe(&*store.read_page(page_id)?, &owners))
        .collect()
}

/// Checks every page and document.
///
/// Callers must keep commits and checkpoints out while this runs.
pub(crate) fn verify(store: &PageStore, collation: &Arc<Collation>) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    let header = match store.read_page(0).and_then(|page| HeaderInfo::from_page(&page)) {
        Ok(header) => header,
        Err(err) => {
            report.push("read header page", None, err);
            return report;
        }
    };
    report.pages_checked += 1;
    if header.invalid_state {
        report.push(
            "read header page",
            None,
            CoreError::invalid_datafile_state("datafile is flagged invalid"),
        );
    }

    let owners = owners(&header);
    let mut data_pages: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for page_id in 1..=store.last_page_id() {
        report.pages_checked += 1;
        let operation = format!("check page {page_id}");
        let page = match store.read_page(page_id) {
            Ok(page) => page,
            Err(err) => {
                report.push(operation, None, err);
                continue;
            }
        };
        let checked = page.validate().and_then(|()| page.page_type());
        let page_type = match checked {
            Ok(page_type) => page_type,
            Err(err) => {
                report.push(operation, None, err);
                continue;
            }
        };
        match page_type {
            PageType::Data => {
                let owner = page.col_id();
                if !owners.contains_key(&owner) {
                    report.push(
                        operation,
                        None,
                        CoreError::invalid_datafile_state(format!(
                            "data page belongs to unknown collection page {owner}"
                        )),
                    );
                    continue;
                }
                let expected = data::expected_list(&page);
                if page.page_list_slot() != expected {
                    report.push(
                        operation,
                        None,
                        CoreError::invalid_datafile_state(format!(
                            "page with {} free bytes is on free list {} instead of {expected}",
                            page.free_bytes(),
                            page.page_list_slot()
                        )),
                    );
                }
                data_pages.entry(owner).or_default().insert(page_id);
            }
            PageType::Collection if !owners.contains_key(&page_id) => {
                report.push(
                    operation,
                    None,
                    CoreError::invalid_datafile_state("collection page missing from the header"),
                );
            }
            PageType::Header => {
                report.push(
                    operation,
                    None,
                    CoreError::invalid_datafile_state("header page outside page 0"),
                );
            }
            _ => {}
        }
    }

    let none = BTreeSet::new();
    for (name, &page_id) in &header.collections {
        let pages = data_pages.get(&page_id).unwrap_or(&none);
        verify_collection(store, collation, name, page_id, pages, &mut report);
    }
    tracing::info!(
        pages = report.pages_checked,
        documents = report.documents_checked,
        issues = report.issues.len(),
        "verification finished"
    );
    report
}

fn verify_collection(
    store: &PageStore,
    collation: &Arc<Collation>,
    name: &str,
    page_id: u32,
    data_pages: &BTreeSet<u32>,
    report: &mut RecoveryReport,
) {
    let operation = format!("check collection '{name}'");
    let page = match store.read_page(page_id) {
        Ok(page) => page,
        Err(err) => {
            report.push(operation, None, err);
            return;
        }
    };
    if !matches!(page.page_type(), Ok(PageType::Collection)) {
        report.push(
            operation,
            None,
            CoreError::invalid_datafile_state(format!("page {page_id} is not a collection page")),
        );
        return;
    }
    if let Err(err) = AutoId::from_byte(page.auto_id_byte()) {
        report.push(operation.clone(), None, err);
    }

    let mut indexes = IndexSet::new(Arc::clone(collation));
    match page.index_entries() {
        Ok(entries) => {
            for entry in entries {
                let added = definition_from_entry(&entry).and_then(|definition| {
                    if definition.is_primary() {
                        return Ok(());
                    }
                    let tree = indexes.build(&definition, [])?;
                    indexes.add(name, definition, tree)
                });
                if let Err(err) = added {
                    report.push(format!("{operation}: index '{}'", entry.name), None, err);
                }
            }
        }
        Err(err) => report.push(operation.clone(), None, err),
    }

    let mut listed = BTreeSet::new();
    for slot in 0..FREE_LIST_SLOTS {
        let mut previous = NO_PAGE;
        let mut next = page.free_list_head(slot);
        while next != NO_PAGE {
            let list = format!("{operation}: free list {slot}");
            if !listed.insert(next) {
                report.push(
                    list,
                    None,
                    CoreError::invalid_datafile_state(format!("page {next} is listed twice")),
                );
                break;
            }
            if !data_pages.contains(&next) {
                report.push(
                    list,
                    None,
                    CoreError::invalid_datafile_state(format!(
                        "page {next} is not a data page of this collection"
                    )),
                );
                break;
            }
            let listed_page = match store.read_page(next) {
                Ok(p) => p,
                Err(err) => {
                    report.push(list, None, err);
                    break;
                }
            };
            if usize::from(listed_page.page_list_slot()) != slot || listed_page.prev_page_id() != previous {
                report.push(
                    list,
                    None,
                    CoreError::invalid_datafile_state(format!("page {next} has inconsistent list links")),
                );
            }
            previous = next;
            next = listed_page.next_page_id();
        }
    }
    for missing in data_pages.difference(&listed) {
        report.push(
            operation.clone(),
            None,
            CoreError::invalid_datafile_state(format!("data page {missing} is on no free list")),
        );
    }

    for &data_page in data_pages {
        let Ok(page) = store.read_page(data_page) else {
            continue;
        };
        for index in page.used_slots() {
            match page.block(index) {
                Ok(block) if block.extend => continue,
                Ok(_) => {}
                Err(err) => {
                    report.push(operation.clone(), None, err);
                    continue;
                }
            }
            let address = PageAddress::new(data_page, index);
            report.documents_checked += 1;
            let checked = data::read(&mut CommittedPages::new(store), address)
                .and_then(|bytes| Ok(decode_document(&bytes)?))
                .and_then(|document| indexes.insert_document(&document, address));
            if let Err(err) = checked {
                report.push(format!("{operation}: document"), Some(address), err);
            }
        }
    }
}
