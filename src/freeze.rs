//! Job orchestration: one PDF in, one frozen PDF out.
//!
//! ## Failure model
//!
//! A job either writes one complete output file or writes nothing. Every
//! step short-circuits on error, and the scratch directory holding the page
//! images is removed on every exit path when its [`tempfile::TempDir`] guard
//! drops.
//!
//! The serial number is reserved before rasterisation starts and is *not*
//! returned if the job later fails, so failed jobs leave gaps in the
//! sequence. The counter's filesystem lock is not taken here; callers that
//! share a data directory between processes wrap their batch in
//! [`SequenceManager::lock`] / [`SequenceManager::unlock`].

use crate::cancel::CancelSignal;
use crate::config::{FreezeJob, OverlayCorner, TierSettings};
use crate::error::FreezeError;
use crate::pipeline::assemble::PdfAssembler;
use crate::pipeline::font::FontSource;
use crate::pipeline::rasterize::{Ghostscript, PageImage, Rasterizer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::sequence::SequenceManager;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreezeReport {
    /// Serial number consumed by this job.
    pub serial: u64,
    /// Formatted label, e.g. `"AR0042"`. Reported even when not stamped.
    pub label: String,
    /// Whether the label was drawn on page 1.
    pub labelled: bool,
    pub pages: usize,
    pub output: PathBuf,
    pub settings: TierSettings,
    pub rasterize_ms: u64,
    pub assemble_ms: u64,
    pub total_ms: u64,
}

/// Runs [`FreezeJob`]s against a rasteriser and a serial counter.
///
/// Generic over the rasteriser so tests can inject a double; production code
/// uses the default [`Ghostscript`].
pub struct Freezer<R = Ghostscript> {
    rasterizer: R,
    sequence: Arc<SequenceManager>,
    font: FontSource,
    progress: ProgressCallback,
}

impl Freezer<Ghostscript> {
    /// Ghostscript from [`gs_locate`] and the counter in the default data
    /// directory.
    pub fn new() -> Self {
        Self::with_parts(
            Ghostscript::new(),
            Arc::new(SequenceManager::open_default()),
        )
    }
}

impl Default for Freezer<Ghostscript> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rasterizer> Freezer<R> {
    pub fn with_parts(rasterizer: R, sequence: Arc<SequenceManager>) -> Self {
        Self {
            rasterizer,
            sequence,
            font: FontSource::default(),
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Overlay typeface. Default: built-in Courier.
    pub fn with_font(mut self, font: FontSource) -> Self {
        self.font = font;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn sequence(&self) -> &Arc<SequenceManager> {
        &self.sequence
    }

    /// Verify the rasterisation engine is present and runnable.
    pub async fn check(&self) -> Result<(), FreezeError> {
        self.rasterizer.check().await
    }

    /// Run one job to completion.
    ///
    /// Only rasterisation observes `cancel` (and the job's
    /// `rasterize_timeout`); once reassembly starts the job runs to the end.
    pub async fn process(
        &self,
        job: &FreezeJob,
        cancel: &CancelSignal,
    ) -> Result<FreezeReport, FreezeError> {
        let total_start = Instant::now();
        info!("Starting freeze: {}", job.input.display());
        self.progress.on_job_start(&job.input);

        // ── Step 1: Engine check ─────────────────────────────────────────
        self.rasterizer.check().await?;

        // ── Step 2: Reserve serial ───────────────────────────────────────
        let serial = self.sequence.next()?;
        let label = job.label_for(serial);
        info!("Reserved serial {serial} ({label})");
        self.progress.on_serial_issued(serial, &label);

        let result = self.run(job, cancel, serial, label, total_start).await;
        if let Err(ref e) = result {
            warn!("Job failed after reserving serial {serial}; number not reused: {e}");
        }
        result
    }

    async fn run(
        &self,
        job: &FreezeJob,
        cancel: &CancelSignal,
        serial: u64,
        label: String,
        total_start: Instant,
    ) -> Result<FreezeReport, FreezeError> {
        // ── Step 3: Scratch directory ────────────────────────────────────
        let workdir = tempfile::Builder::new()
            .prefix("pdf-freezer-")
            .tempdir()
            .map_err(|e| FreezeError::Internal(format!("cannot create temp directory: {e}")))?;
        debug!("Working directory {}", workdir.path().display());

        // ── Step 4: Rasterise ────────────────────────────────────────────
        let settings = job.tier_settings();
        let cancel = match job.rasterize_timeout {
            Some(t) => cancel.with_timeout(t),
            None => cancel.clone(),
        };
        let raster_start = Instant::now();
        let pages = self
            .rasterizer
            .extract_pages(&job.input, workdir.path(), settings, &cancel)
            .await?;
        let rasterize_ms = raster_start.elapsed().as_millis() as u64;
        info!("Rasterised {} pages in {}ms", pages.len(), rasterize_ms);

        // ── Step 5: Reject empty output ──────────────────────────────────
        if pages.is_empty() {
            return Err(FreezeError::EmptyDocument {
                path: job.input.clone(),
            });
        }
        self.progress.on_pages_rasterized(pages.len());

        // ── Step 6: Overlay font on disk for the job's lifetime ──────────
        let font = if job.overlay {
            self.font.materialize()?
        } else {
            None
        };

        // ── Steps 7–9: Reassemble and save ───────────────────────────────
        let overlay_text = job.overlay.then(|| label.clone());
        let corner = job.corner;
        let output = job.output.clone();
        let progress = Arc::clone(&self.progress);
        let assemble_start = Instant::now();

        let page_count = tokio::task::spawn_blocking(move || {
            // Page images and font file must outlive the save.
            let _workdir = workdir;
            assemble(
                &pages,
                font.as_ref().map(|f| f.path()),
                overlay_text.as_deref(),
                corner,
                &output,
                &progress,
            )
        })
        .await
        .map_err(|e| FreezeError::Internal(format!("Assembly task panicked: {e}")))??;
        let assemble_ms = assemble_start.elapsed().as_millis() as u64;

        self.progress.on_job_complete(&job.output, page_count);
        let report = FreezeReport {
            serial,
            label,
            labelled: job.overlay,
            pages: page_count,
            output: job.output.clone(),
            settings,
            rasterize_ms,
            assemble_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Freeze complete: {} pages → {} in {}ms",
            report.pages,
            report.output.display(),
            report.total_ms
        );
        Ok(report)
    }
}

/// Blocking part of the job: add every page in order, label page 1, save.
fn assemble(
    pages: &[PageImage],
    font: Option<&Path>,
    label: Option<&str>,
    corner: OverlayCorner,
    output: &Path,
    progress: &ProgressCallback,
) -> Result<usize, FreezeError> {
    let mut assembler = PdfAssembler::new(font);
    let total = pages.len();
    for page in pages {
        let text = if page.number == 1 { label } else { None };
        assembler.add_page(&page.path, text, corner, page.dpi)?;
        progress.on_page_added(page.number, total);
    }
    assembler.save(output)?;
    Ok(total)
}
