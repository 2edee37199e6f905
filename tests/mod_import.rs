use std::sync::Arc;

use nexus_pages::import::{self, IMPORT_REPORT_ID, ImportAccumulator, ImportRecordJob, ImportReportJob};
use nexus_pages::page::{PageStore, Value};
use nexus_pages::queue::Job;
use tempfile::tempdir;

/// A full CSV batch, run the way `nexus-pages import` drives it: parse,
/// one job per record, then the trailing report job. Exercises deep-merge,
/// the `inv_item` skeleton, array ops, and per-record failure isolation
/// together.
#[test]
fn csv_batch_creates_updates_and_isolates_a_bad_row() {
    let dir = tempdir().unwrap();
    let store = Arc::new(PageStore::without_events(dir.path()));

    // Pre-existing page to be updated by the batch.
    let mut existing = store.open("hammer").unwrap();
    existing.front_matter.set_top("title", Value::from("Old Hammer"));
    existing.set_body("# Hammer".to_string(), chrono::Utc::now());
    store.save(existing).unwrap();

    let csv = "\
identifier,template,title,inventory.container,array_add:tags\n\
hammer,,New Hammer,tool_box,heavy\n\
screwdriver,inv_item,Screwdriver,tool_box,\n\
,,Missing Id,,\n";

    let records = import::parse_records(csv.as_bytes()).unwrap();
    assert_eq!(records.len(), 3);

    let accumulator = ImportAccumulator::new();
    for record in records {
        ImportRecordJob::new(store.clone(), accumulator.clone(), record).execute().unwrap();
    }
    ImportReportJob::new(store.clone(), accumulator.clone()).execute().unwrap();

    let (created, updated, failed) = accumulator.snapshot();
    assert_eq!(created, vec!["screwdriver".to_string()]);
    assert_eq!(updated, vec!["hammer".to_string()]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].row_number, 3);

    let hammer = store.open("hammer").unwrap();
    assert_eq!(hammer.front_matter.get_path("title").unwrap().as_str(), Some("New Hammer"));
    assert_eq!(hammer.front_matter.get_path("inventory.container").unwrap().as_str(), Some("tool_box"));
    let tags: Vec<&str> = hammer.front_matter.get_path("tags").unwrap().as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert_eq!(tags, vec!["heavy"]);

    let screwdriver = store.open("screwdriver").unwrap();
    assert!(!screwdriver.is_new);
    assert!(screwdriver.front_matter.get_path("inventory").is_some());
    assert!(!screwdriver.versioned_text.current.is_empty());

    let report = store.open(IMPORT_REPORT_ID).unwrap();
    assert!(report.versioned_text.current.contains("created: 1"));
    assert!(report.versioned_text.current.contains("updated: 1"));
    assert!(report.versioned_text.current.contains("failed: 1"));
}
