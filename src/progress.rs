//! Progress reporting on a single 0–100 scale.
//!
//! Inject an [`Arc<dyn BookProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! the percentage as the pipeline advances. The scale is split into bands:
//!
//! ```text
//!  5  start
//! 10  page count obtained (or given up on)
//! 15  image extraction attempted
//! 15..=60  Phase 1, proportional to page markers seen in the stream
//! 60  phase boundary
//! 60..=100 Phase 2, advanced before each chunk request
//! 100 done
//! ```
//!
//! Callbacks are invoked synchronously from the conversion task, in order.
//!
//! # Example
//!
//! ```rust
//! use pdf2book::{BookProgressCallback, ConversionConfig};
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl BookProgressCallback for Print {
//!     fn on_progress(&self, percent: u8) {
//!         eprintln!("{percent}%");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Print))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

pub const PROGRESS_START: u8 = 5;
pub const PROGRESS_PAGE_COUNT: u8 = 10;
pub const PROGRESS_IMAGES: u8 = 15;
pub const EXTRACT_BAND_START: u8 = 15;
pub const EXTRACT_BAND_END: u8 = 60;
pub const REFINE_BAND_START: u8 = 60;
pub const REFINE_BAND_END: u8 = 100;

/// Receives pipeline progress. All methods default to no-ops.
pub trait BookProgressCallback: Send + Sync {
    /// Overall completion, 0–100. Values never decrease within one run.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// A Phase-2 chunk was kept verbatim because refinement failed.
    ///
    /// # Arguments
    /// * `chunk` — 1-indexed chunk number
    /// * `total` — number of chunks
    /// * `error` — human-readable reason
    fn on_chunk_fallback(&self, chunk: usize, total: usize, error: &str) {
        let _ = (chunk, total, error);
    }

    /// A [`crate::queue::BookQueue`] is starting job `job` (1-indexed) of
    /// `total`. Sent before any other event for that job, including for
    /// inputs that fail before reporting progress.
    fn on_job_start(&self, job: usize, total: usize) {
        let _ = (job, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BookProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn BookProgressCallback>;

/// Phase-1 position for `markers` page markers out of `page_hint` pages.
///
/// Returns `None` when the hint is zero: without a page count the band is
/// not advanced until the stream completes.
pub fn extract_progress(markers: usize, page_hint: usize) -> Option<u8> {
    if page_hint == 0 {
        return None;
    }
    let ratio = (markers as f64 / page_hint as f64).min(1.0);
    let span = f64::from(EXTRACT_BAND_END - EXTRACT_BAND_START);
    Some(EXTRACT_BAND_START + (ratio * span).round() as u8)
}

/// Phase-2 position reported before chunk `index` (0-based) of `count`.
pub fn refine_progress(index: usize, count: usize) -> u8 {
    if count == 0 {
        return REFINE_BAND_START;
    }
    let ratio = (index as f64 / count as f64).min(1.0);
    let span = f64::from(REFINE_BAND_END - REFINE_BAND_START);
    REFINE_BAND_START + (ratio * span).round() as u8
}

/// Forwards progress to an optional callback, never letting it go backwards.
///
/// One reporter lives for one conversion; the phases share it so the whole
/// run stays monotonic.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: u8,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback, last: 0 }
    }

    pub fn report(&mut self, percent: u8) {
        let percent = percent.clamp(self.last, 100);
        self.last = percent;
        if let Some(ref cb) = self.callback {
            cb.on_progress(percent);
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn chunk_fallback(&self, chunk: usize, total: usize, error: &str) {
        if let Some(ref cb) = self.callback {
            cb.on_chunk_fallback(chunk, total, error);
        }
    }
}
