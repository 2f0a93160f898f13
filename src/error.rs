//! Error types for the pdf-freezer library.
//!
//! A freeze job has no partial-success mode: a document is either fully
//! rasterised, reassembled and saved, or nothing is written. Every failure is
//! therefore a single fatal [`FreezeError`] that aborts the current job and
//! is returned from the top-level entry points unchanged.
//!
//! The variants follow the pipeline stages so callers can branch on *where*
//! a job failed:
//!
//! | Stage | Variants |
//! |-------|----------|
//! | engine check | [`FreezeError::DependencyMissing`] |
//! | serial number | [`FreezeError::Counter`], [`FreezeError::AlreadyLocked`], [`FreezeError::LockRelease`] |
//! | rasterisation | [`FreezeError::Rasterization`], [`FreezeError::Cancelled`], [`FreezeError::EmptyDocument`] |
//! | reassembly | [`FreezeError::ImageDecode`], [`FreezeError::Font`], [`FreezeError::OutputWriteFailed`] |

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-freezer library.
#[derive(Debug, Error)]
pub enum FreezeError {
    // ── Engine errors ─────────────────────────────────────────────────────
    /// The rasterisation engine is absent or does not run.
    #[error(
        "Ghostscript not found or not working ('{executable}'): {detail}\n\
         Install Ghostscript or set PDF_FREEZER_GS=/path/to/gs."
    )]
    DependencyMissing { executable: PathBuf, detail: String },

    /// The engine ran but exited abnormally.
    #[error("Ghostscript failed: {detail}\nOutput: {output}")]
    Rasterization { detail: String, output: String },

    /// The rasterisation was aborted by the job's cancellation signal.
    #[error("Ghostscript failed: {reason}")]
    Cancelled { reason: String },

    /// The engine exited successfully but produced no page images.
    #[error("No pages extracted from '{path}'\nIs the document empty or unreadable?")]
    EmptyDocument { path: PathBuf },

    // ── Counter errors ────────────────────────────────────────────────────
    /// The sequence state file could not be read or written.
    #[error("Counter error at '{path}': {source}")]
    Counter {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lock marker already exists.
    #[error(
        "Counter is locked by another instance or process ('{path}').\n\
         If no other instance is running, clear it with `pdf-freezer number unlock --force`."
    )]
    AlreadyLocked { path: PathBuf },

    /// The lock marker exists but could not be removed.
    #[error("Failed to remove lock file '{path}': {source}")]
    LockRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Reassembly errors ─────────────────────────────────────────────────
    /// A rasterised page image could not be opened or its header decoded.
    #[error("Failed to read page image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// The overlay font could not be loaded or set.
    #[error("Failed to set font: {detail}")]
    Font { detail: String },

    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    // ── Settings errors ───────────────────────────────────────────────────
    /// The persisted settings file could not be written.
    #[error("Failed to save settings to '{path}': {detail}")]
    Settings { path: PathBuf, detail: String },

    // ── Input / config errors ─────────────────────────────────────────────
    /// The caller supplied an unusable input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FreezeError {
    /// `true` for failures of the external rasterisation step, including
    /// cancellation.
    pub fn is_rasterization(&self) -> bool {
        matches!(
            self,
            FreezeError::Rasterization { .. } | FreezeError::Cancelled { .. }
        )
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        FreezeError::OutputWriteFailed {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}
