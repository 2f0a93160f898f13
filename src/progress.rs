//! Progress-callback trait for freeze-job events.
//!
//! Inject an [`Arc<dyn FreezeProgressCallback>`] via
//! [`crate::freeze::Freezer::with_progress`] to receive events as a job moves
//! through the pipeline.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a GUI status line
//! or a log without the library knowing how the host application
//! communicates. Events are delivered from whichever thread runs the step,
//! including the blocking pool used for reassembly, so the trait is
//! `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use pdf_freezer::{FreezeProgressCallback, Freezer};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     added: AtomicUsize,
//! }
//!
//! impl FreezeProgressCallback for PageCounter {
//!     fn on_page_added(&self, page_num: usize, total_pages: usize) {
//!         self.added.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page_num}/{total_pages} added");
//!     }
//! }
//!
//! let freezer = Freezer::new()
//!     .with_progress(Arc::new(PageCounter { added: AtomicUsize::new(0) }));
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the freeze pipeline as a job advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one job arrive in order:
/// `on_job_start`, `on_serial_issued`, `on_pages_rasterized`,
/// `on_page_added` once per page, then `on_job_complete`. A failed job stops
/// emitting at the failing step.
pub trait FreezeProgressCallback: Send + Sync {
    /// Called once before the serial number is reserved.
    fn on_job_start(&self, input: &Path) {
        let _ = input;
    }

    /// Called after the counter has advanced.
    ///
    /// # Arguments
    /// * `number`: the reserved serial number
    /// * `label`: the formatted label, e.g. `"AR0042"`
    fn on_serial_issued(&self, number: u64, label: &str) {
        let _ = (number, label);
    }

    /// Called when the rasteriser has produced every page image.
    fn on_pages_rasterized(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after each page is added to the output document.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: total pages in the document
    fn on_page_added(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once the output file has been written.
    fn on_job_complete(&self, output: &Path, total_pages: usize) {
        let _ = (output, total_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl FreezeProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored in [`crate::freeze::Freezer`].
pub type ProgressCallback = Arc<dyn FreezeProgressCallback>;
