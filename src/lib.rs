//! # pdf-freezer
//!
//! "Freeze" PDF documents: rasterise every page into an image and rebuild the
//! document from those images, optionally stamping a sequential serial label
//! (e.g. `AR0042`) on the first page.
//!
//! ## Why this crate?
//!
//! A frozen PDF looks exactly like its source but carries no selectable text,
//! form fields, annotations, or scripts. Each page is a single JPEG, so the
//! content cannot be edited in place, and the serial label ties every issued
//! copy to one entry in a persisted counter.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source.pdf
//!  │
//!  ├─ 1. Check      Ghostscript located and runnable
//!  ├─ 2. Serial     next number from the persisted counter
//!  ├─ 3. Rasterise  gs → page-1.jpg … page-N.jpg in a scoped temp dir
//!  ├─ 4. Assemble   one PDF page per image, sized from pixels and DPI
//!  ├─ 5. Label      serial text on page 1 (optional)
//!  └─ 6. Save       atomic write to the output path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_freezer::{CancelSignal, FreezerApp, ProcessOverrides};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = FreezerApp::new();
//!     app.check_dependencies().await?;
//!
//!     let report = app
//!         .process_file(
//!             Path::new("contract.pdf"),
//!             &ProcessOverrides::default(),
//!             &CancelSignal::new(),
//!         )
//!         .await?;
//!     println!("{} → {}", report.label, report.output.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-freezer` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-freezer = { version = "0.1", default-features = false }
//! ```
//!
//! ## Compression Tiers
//!
//! | Tier     | DPI | JPEG quality |
//! |----------|-----|--------------|
//! | `none`   | 300 | 95 |
//! | `low`    | 200 | 85 |
//! | `medium` | 150 | 75 |
//! | `high`   | 100 | 65 |
//!
//! Unknown tier names resolve to `none`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod app;
pub mod cancel;
pub mod config;
pub mod error;
pub mod freeze;
pub mod pipeline;
pub mod progress;
pub mod sequence;
pub mod settings;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use app::{FreezerApp, ProcessOverrides};
pub use cancel::{CancelReason, CancelSignal};
pub use config::{
    serial_label, CompressionTier, FreezeJob, FreezeJobBuilder, OverlayCorner, TierSettings,
    DEFAULT_PREFIX,
};
pub use error::FreezeError;
pub use freeze::{FreezeReport, Freezer};
pub use pipeline::assemble::PdfAssembler;
pub use pipeline::font::{FontSource, OverlayFont};
pub use pipeline::rasterize::{Ghostscript, PageImage, Rasterizer};
pub use progress::{FreezeProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sequence::SequenceManager;
pub use settings::{default_data_dir, Settings, SettingsStore};
