//! The indexing service (C6): fans page events onto the `"frontmatter"` and
//! `"fulltext"` queues and tracks aggregate progress across both (spec
//! §4.6). `waitForCompletion` exposes the three-state `done`/`timeout`/
//! `cancelled` semantics verbatim.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::Result;
use crate::events::{EventSink, PageEvent};
use crate::index::frontmatter::FrontMatterIndex;
use crate::index::fulltext::FullTextIndex;
use crate::page::PageStore;
use crate::queue::{Coordinator, FnJob};

const FRONTMATTER_QUEUE: &str = "frontmatter";
const FULLTEXT_QUEUE: &str = "fulltext";

/// Outcome of [`IndexingService::wait_for_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Both queues drained to zero remaining jobs before the deadline.
    Done,
    /// The deadline elapsed with jobs still outstanding.
    TimedOut,
    /// The caller's cancellation token fired first.
    Cancelled,
}

/// Registers the two named queues on `coordinator` and fans every
/// [`PageEvent`] it receives onto both.
pub struct IndexingService {
    coordinator: Coordinator,
    front_matter: Arc<FrontMatterIndex>,
    full_text: Arc<FullTextIndex>,
    store: Arc<PageStore>,
}

impl IndexingService {
    #[must_use]
    pub fn new(coordinator: Coordinator, front_matter: Arc<FrontMatterIndex>, full_text: Arc<FullTextIndex>, store: Arc<PageStore>) -> Self {
        coordinator.register_queue(FRONTMATTER_QUEUE);
        coordinator.register_queue(FULLTEXT_QUEUE);
        Self { coordinator, front_matter, full_text, store }
    }

    #[must_use]
    pub fn front_matter_index(&self) -> &Arc<FrontMatterIndex> {
        &self.front_matter
    }

    #[must_use]
    pub fn full_text_index(&self) -> &Arc<FullTextIndex> {
        &self.full_text
    }

    /// Enqueue index-maintenance jobs for a single event, one per queue.
    ///
    /// # Errors
    /// Returns [`PageError::NoSuchQueue`] if either queue is somehow
    /// unregistered (cannot happen via this type, kept for callers driving
    /// the coordinator directly in tests).
    pub fn enqueue_index(&self, event: PageEvent) -> Result<()> {
        let fm_index = self.front_matter.clone();
        let ft_index = self.full_text.clone();
        let store = self.store.clone();
        let fm_event = event.clone();
        self.coordinator.enqueue(
            FRONTMATTER_QUEUE,
            Box::new(FnJob::new("frontmatter-update", move || {
                apply_frontmatter(&fm_index, &store, &fm_event);
                Ok(())
            })),
        )?;

        let store = self.store.clone();
        self.coordinator.enqueue(
            FULLTEXT_QUEUE,
            Box::new(FnJob::new("fulltext-update", move || {
                apply_fulltext(&ft_index, &store, &event);
                Ok(())
            })),
        )?;
        Ok(())
    }

    /// Enqueue index-maintenance jobs for every id currently in the store,
    /// used to rebuild both indexes from scratch.
    ///
    /// # Errors
    /// Returns [`PageError::Io`] if listing the store fails.
    pub fn enqueue_bulk_reindex(&self) -> Result<usize> {
        let ids = self.store.list()?;
        let count = ids.len();
        for id in ids {
            self.enqueue_index(PageEvent::Upsert(id))?;
        }
        Ok(count)
    }

    /// `min(completed)` / `max(total)` across both queues (spec §4.6), where
    /// each queue's `completed = highWaterMark - jobsRemaining`.
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        let fm = self.coordinator.queue_stats(FRONTMATTER_QUEUE).expect("frontmatter queue is registered in new()");
        let ft = self.coordinator.queue_stats(FULLTEXT_QUEUE).expect("fulltext queue is registered in new()");
        let fm_completed = fm.high_water_mark.saturating_sub(fm.jobs_remaining as u64);
        let ft_completed = ft.high_water_mark.saturating_sub(ft.jobs_remaining as u64);
        (fm_completed.min(ft_completed), fm.high_water_mark.max(ft.high_water_mark))
    }

    /// Block until both queues fully drain, `timeout` elapses, or `cancel`
    /// fires — whichever comes first.
    pub async fn wait_for_completion(&self, timeout: Duration, cancel: &tokio_util::sync::CancellationToken) -> WaitOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (completed, total) = self.progress();
            if completed >= total {
                return WaitOutcome::Done;
            }
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if tokio::time::Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            tokio::select! {
                () = cancel.cancelled() => return WaitOutcome::Cancelled,
                () = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
    }
}

fn apply_frontmatter(index: &FrontMatterIndex, store: &PageStore, event: &PageEvent) {
    match event {
        PageEvent::Upsert(id) => match store.read_front_matter(id.as_str()) {
            Ok((_, fm)) => index.replace_for_id(id.as_str(), fm.flatten()),
            Err(e) => log::warn!("frontmatter reindex could not read '{id}': {e}"),
        },
        PageEvent::Remove(id) => index.remove_id(id.as_str()),
    }
}

fn apply_fulltext(index: &FullTextIndex, store: &PageStore, event: &PageEvent) {
    match event {
        PageEvent::Upsert(id) => match store.read_markdown(id.as_str()) {
            Ok((_, body)) => {
                let mut text = String::new();
                if let Ok((_, fm)) = store.read_front_matter(id.as_str()) {
                    for field in ["title", "description"] {
                        if let Some(value) = fm.get_top(field).and_then(crate::page::Value::as_str) {
                            text.push_str(value);
                            text.push('\n');
                        }
                    }
                }
                text.push_str(&body);
                if let Err(e) = index.upsert(id.as_str(), &text) {
                    log::warn!("fulltext reindex could not upsert '{id}': {e}");
                }
            }
            Err(e) => log::warn!("fulltext reindex could not read '{id}': {e}"),
        },
        PageEvent::Remove(id) => {
            if let Err(e) = index.remove(id.as_str()) {
                log::warn!("fulltext reindex could not remove '{id}': {e}");
            }
        }
    }
}

/// An [`EventSink`] that forwards every event into an [`IndexingService`].
pub struct IndexingSink(pub Arc<IndexingService>);

impl EventSink for IndexingSink {
    fn emit(&self, event: PageEvent) {
        if let Err(e) = self.0.enqueue_index(event) {
            log::error!("indexing service could not enqueue event: {e}");
        }
    }
}
