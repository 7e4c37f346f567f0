//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] into the search loop, the
//! manual-edit station or [`crate::run::Pipeline`] to observe what the
//! pipeline is doing: which `skip` is being tried, when a lookup is in
//! flight, and above all when the run is parked waiting for the operator to
//! save an edited address. The CLI turns these events into a spinner; the
//! library itself only logs.
//!
//! # Example
//!
//! ```rust
//! use pdf_envelope::PipelineProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     attempts: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_search_attempt(&self, skip: usize, accepted: bool) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("skip={} accepted={}", skip, accepted);
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline is single-threaded; `Send + Sync` lets
/// a callback be shared with a UI thread such as a ticking spinner.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called after each extraction attempt of the search loop.
    ///
    /// # Arguments
    /// * `skip`    : offset used for this attempt (0-based)
    /// * `accepted`: whether the candidate passed validation
    fn on_search_attempt(&self, skip: usize, accepted: bool) {
        let _ = (skip, accepted);
    }

    /// Called once the search loop has produced an accepted candidate.
    fn on_candidate_found(&self, skip: usize, text: &str) {
        let _ = (skip, text);
    }

    /// Called before each request to the address service.
    ///
    /// # Arguments
    /// * `what`: short description, e.g. `"list lookup"`
    fn on_lookup_start(&self, what: &str) {
        let _ = what;
    }

    /// Called when the request started by `on_lookup_start` returns.
    fn on_lookup_complete(&self, what: &str) {
        let _ = what;
    }

    /// Called when the editor has been launched and the pipeline starts
    /// waiting for the file at `path` to be saved with new content.
    fn on_edit_waiting(&self, path: &Path) {
        let _ = path;
    }

    /// Called when the edited content has been picked up.
    fn on_edit_complete(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// The callback used when none is configured.
pub fn noop() -> ProgressCallback {
    Arc::new(NoopProgressCallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        attempts: AtomicUsize,
        accepted: AtomicUsize,
        waits: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_search_attempt(&self, _skip: usize, accepted: bool) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if accepted {
                self.accepted.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_edit_waiting(&self, _path: &Path) {
            self.waits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_search_attempt(0, false);
        cb.on_candidate_found(1, "M. DUPONT");
        cb.on_lookup_start("list lookup");
        cb.on_lookup_complete("list lookup");
        cb.on_edit_waiting(Path::new("/tmp/x.txt"));
        cb.on_edit_complete();
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            attempts: AtomicUsize::new(0),
            accepted: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
        };
        tracker.on_search_attempt(0, false);
        tracker.on_search_attempt(1, true);
        tracker.on_edit_waiting(Path::new("a.txt"));

        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.accepted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.waits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = noop();
        cb.on_search_attempt(3, true);
        cb.on_candidate_found(3, "text");
    }
}
