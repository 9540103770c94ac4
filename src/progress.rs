//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to be told when
//! the manifest is resolved, as each page lands on disk, and when assembly
//! starts. The CLI drives a progress bar from it; the bot uses
//! [`on_assembly_start`](PipelineProgressCallback::on_assembly_start) to tell
//! the requester their pages are in.
//!
//! Page events fire from the fetch worker pool, so they arrive out of order
//! and possibly concurrently. Implementations guard shared state themselves.

use std::sync::Arc;

/// Called by the pipeline as a request moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the manifest is parsed.
    ///
    /// # Arguments
    /// * `label`      : manuscript label
    /// * `total_pages`: number of pages that will be fetched
    fn on_manifest_resolved(&self, label: &str, total_pages: usize) {
        let _ = (label, total_pages);
    }

    /// Called when a page file has been fully written.
    ///
    /// # Arguments
    /// * `index`      : 0-based page index
    /// * `total_pages`: total pages in the manuscript
    /// * `bytes`      : size of the downloaded image
    fn on_page_fetched(&self, index: usize, total_pages: usize, bytes: usize) {
        let _ = (index, total_pages, bytes);
    }

    /// Called before a failed page attempt is retried.
    fn on_page_retry(&self, index: usize, attempt: u32, error: &str) {
        let _ = (index, attempt, error);
    }

    /// Called once every page is on disk, before the PDF is built.
    fn on_assembly_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after the PDF has been written.
    fn on_assembly_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        fetched: AtomicUsize,
        retries: AtomicUsize,
        assembled: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_page_fetched(&self, _index: usize, _total_pages: usize, _bytes: usize) {
            self.fetched.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_retry(&self, _index: usize, _attempt: u32, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_assembly_complete(&self, total_pages: usize) {
            self.assembled.store(total_pages, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_manifest_resolved("MSS Vat.lat.3225", 5);
        cb.on_page_fetched(0, 5, 1024);
        cb.on_page_retry(1, 1, "HTTP 503");
        cb.on_assembly_start(5);
        cb.on_assembly_complete(5);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_fetched(1, 3, 10);
        tracker.on_page_fetched(0, 3, 10);
        tracker.on_page_retry(2, 1, "timeout");
        tracker.on_page_fetched(2, 3, 10);
        tracker.on_assembly_complete(3);

        assert_eq!(tracker.fetched.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.assembled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_manifest_resolved("x", 1);
        cb.on_page_fetched(0, 1, 1);
    }
}
