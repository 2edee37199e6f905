//! Page change events that flow from the store (C2) into the indexing
//! service (C6). Kept as a small trait so the store does not depend on the
//! coordinator directly (spec §3: "Writers must never hold a page lock
//! while enqueuing events").

use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::identifier::Identifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Upsert(Identifier),
    Remove(Identifier),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PageEvent);
}

/// A sink that drops every event, for store-only tests and tools that don't
/// need indexing fan-out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PageEvent) {}
}

/// Broadcasts every event to each of several sinks, in order.
pub struct FanOutSink(pub Vec<Arc<dyn EventSink>>);

impl EventSink for FanOutSink {
    fn emit(&self, event: PageEvent) {
        for sink in &self.0 {
            sink.emit(event.clone());
        }
    }
}

/// A sink whose real destination is only known after the [`PageStore`] that
/// holds it has already been constructed — breaks the construction cycle
/// where the store needs a sink and the sink (the indexing service) needs
/// an `Arc` to the store. Bind the real sink once, immediately after both
/// sides exist; events emitted before that are logged and dropped.
///
/// [`PageStore`]: crate::page::PageStore
#[derive(Default)]
pub struct DeferredSink {
    inner: OnceCell<Arc<dyn EventSink>>,
}

impl DeferredSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the real sink. Calling this more than once is a no-op after the
    /// first call.
    pub fn bind(&self, sink: Arc<dyn EventSink>) {
        let _ = self.inner.set(sink);
    }
}

impl EventSink for DeferredSink {
    fn emit(&self, event: PageEvent) {
        match self.inner.get() {
            Some(sink) => sink.emit(event),
            None => log::warn!("page event emitted before a sink was bound to DeferredSink; dropped"),
        }
    }
}
