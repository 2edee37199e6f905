use std::sync::Arc;
use std::time::Duration;

use nexus_pages::events::{DeferredSink, EventSink};
use nexus_pages::index::{FrontMatterIndex, FullTextIndex, IndexingService, IndexingSink, WaitOutcome};
use nexus_pages::page::{PageStore, Value};
use nexus_pages::queue::Coordinator;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

/// Scenario 5 (spec §8): saving a page with `inventory.container = "box"`
/// and waiting for `waitForCompletion` makes it show up under
/// `findBy("inventory.container", "box")`.
#[tokio::test]
async fn index_reflects_saved_page_after_wait_for_completion() {
    let dir = tempdir().unwrap();
    let deferred = Arc::new(DeferredSink::new());
    let store = Arc::new(PageStore::new(dir.path(), deferred.clone() as Arc<dyn EventSink>));

    let coordinator = Coordinator::new();
    let fm_index = Arc::new(FrontMatterIndex::new());
    let ft_index = Arc::new(FullTextIndex::open_or_create(&dir.path().join("_fulltext")).unwrap());
    let indexing = Arc::new(IndexingService::new(coordinator, fm_index, ft_index, store.clone()));
    deferred.bind(Arc::new(IndexingSink(indexing.clone())));

    let mut page = store.open("x").unwrap();
    page.front_matter.set_path("inventory.container", Value::from("box")).unwrap();
    page.set_body("# x".to_string(), chrono::Utc::now());
    store.save(page).unwrap();

    let cancel = CancellationToken::new();
    let outcome = indexing.wait_for_completion(Duration::from_secs(5), &cancel).await;
    assert_eq!(outcome, WaitOutcome::Done);

    let hits = indexing.front_matter_index().query_exact_match("inventory.container", "box");
    assert_eq!(hits, vec!["x".to_string()]);
}

/// A removed page drops out of the front-matter index once indexing catches up.
#[tokio::test]
async fn index_drops_a_removed_page() {
    let dir = tempdir().unwrap();
    let deferred = Arc::new(DeferredSink::new());
    let store = Arc::new(PageStore::new(dir.path(), deferred.clone() as Arc<dyn EventSink>));

    let coordinator = Coordinator::new();
    let fm_index = Arc::new(FrontMatterIndex::new());
    let ft_index = Arc::new(FullTextIndex::open_or_create(&dir.path().join("_fulltext")).unwrap());
    let indexing = Arc::new(IndexingService::new(coordinator, fm_index, ft_index, store.clone()));
    deferred.bind(Arc::new(IndexingSink(indexing.clone())));

    let mut page = store.open("gone").unwrap();
    page.front_matter.set_top("kind", Value::from("ephemeral"));
    store.save(page).unwrap();
    let cancel = CancellationToken::new();
    indexing.wait_for_completion(Duration::from_secs(5), &cancel).await;
    assert_eq!(indexing.front_matter_index().query_exact_match("kind", "ephemeral"), vec!["gone".to_string()]);

    store.delete("gone").unwrap();
    indexing.wait_for_completion(Duration::from_secs(5), &cancel).await;
    assert!(indexing.front_matter_index().query_exact_match("kind", "ephemeral").is_empty());
}
