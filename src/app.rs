//! Application facade: the operation surface a front end (CLI or GUI) calls.
//!
//! [`FreezerApp`] owns the shared components (counter, settings store,
//! rasteriser) and resolves per-call overrides against the persisted
//! [`Settings`] before handing a [`FreezeJob`] to the [`Freezer`].
//!
//! ## Degraded mode
//!
//! Construction never fails. If the data directory cannot be prepared the
//! affected component is left out and logged; operations that need it
//! return [`FreezeError::Internal`] (`"counter not initialized"`,
//! `"settings not initialized"`) while everything else keeps working.
//! Without a settings store, jobs use [`Settings::default`].

use crate::cancel::CancelSignal;
use crate::config::{CompressionTier, FreezeJob, OverlayCorner, DEFAULT_PREFIX};
use crate::error::FreezeError;
use crate::freeze::{FreezeReport, Freezer};
use crate::pipeline::font::FontSource;
use crate::pipeline::rasterize::{Ghostscript, Rasterizer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::sequence::SequenceManager;
use crate::settings::{default_data_dir, Settings, SettingsStore, DEFAULT_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Per-call values that take precedence over the persisted settings.
///
/// `None` (and, for strings, the empty string) means "use the setting".
#[derive(Debug, Clone, Default)]
pub struct ProcessOverrides {
    pub overlay: Option<bool>,
    pub prefix: Option<String>,
    pub position: Option<String>,
    pub suffix: Option<String>,
    pub overwrite: Option<bool>,
    pub compression: Option<String>,
    pub rasterize_timeout: Option<Duration>,
}

/// Front-end facing entry point.
pub struct FreezerApp<R = Ghostscript> {
    data_dir: PathBuf,
    rasterizer: Arc<R>,
    counter: Option<Arc<SequenceManager>>,
    settings: Option<SettingsStore>,
    font: FontSource,
    progress: ProgressCallback,
}

impl FreezerApp<Ghostscript> {
    /// App using the default data directory and the located Ghostscript.
    pub fn new() -> Self {
        Self::open(default_data_dir())
    }

    /// App storing its state in `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_rasterizer(data_dir, Ghostscript::new())
    }
}

impl Default for FreezerApp<Ghostscript> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rasterizer> FreezerApp<R> {
    pub fn with_rasterizer(data_dir: impl Into<PathBuf>, rasterizer: R) -> Self {
        let data_dir = data_dir.into();

        let counter = match std::fs::create_dir_all(&data_dir) {
            Ok(()) => Some(Arc::new(SequenceManager::new(&data_dir))),
            Err(e) => {
                error!("Failed to init counter in {}: {e}", data_dir.display());
                None
            }
        };

        let settings = match SettingsStore::open(&data_dir) {
            Ok(s) => Some(s),
            Err(e) => {
                error!("Failed to init settings: {e}");
                None
            }
        };

        info!("App data directory: {}", data_dir.display());
        Self {
            data_dir,
            rasterizer: Arc::new(rasterizer),
            counter,
            settings,
            font: FontSource::default(),
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Overlay typeface for every job. Default: built-in Courier.
    pub fn with_font(mut self, font: FontSource) -> Self {
        self.font = font;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ── Engine ────────────────────────────────────────────────────────────

    pub async fn check_dependencies(&self) -> Result<(), FreezeError> {
        let result = self.rasterizer.check().await;
        if let Err(ref e) = result {
            error!("Dependency check failed: {e}");
        }
        result
    }

    // ── Jobs ──────────────────────────────────────────────────────────────

    /// Resolve `input` and `overrides` into a job without running it.
    ///
    /// Each value comes from the override, then the settings, then the
    /// built-in default.
    pub fn plan(
        &self,
        input: &Path,
        overrides: &ProcessOverrides,
    ) -> Result<FreezeJob, FreezeError> {
        if input.as_os_str().is_empty() {
            return Err(FreezeError::InvalidInput("no input file selected".into()));
        }
        let settings = self.settings();

        let overwrite = overrides.overwrite.unwrap_or(settings.overwrite_mode);
        let output = if overwrite {
            input.to_path_buf()
        } else {
            let suffix = first_non_empty([
                overrides.suffix.as_deref(),
                Some(settings.file_suffix.as_str()),
            ])
            .unwrap_or(DEFAULT_SUFFIX);
            sibling_output(input, suffix)
        };

        let prefix =
            first_non_empty([overrides.prefix.as_deref(), Some(settings.prefix.as_str())])
                .unwrap_or(DEFAULT_PREFIX);
        let corner = match first_non_empty([overrides.position.as_deref()]) {
            Some(name) => OverlayCorner::resolve(name),
            None => settings.overlay_position,
        };
        let compression = match first_non_empty([overrides.compression.as_deref()]) {
            Some(name) => CompressionTier::resolve(name),
            None => settings.compression_level,
        };

        let mut builder = FreezeJob::builder(input, output)
            .overlay(overrides.overlay.unwrap_or(settings.overlay))
            .prefix(prefix)
            .corner(corner)
            .compression(compression);
        if let Some(t) = overrides.rasterize_timeout {
            builder = builder.rasterize_timeout(t);
        }
        builder.build()
    }

    /// Freeze `input` and return the report (its `output` is the written path).
    pub async fn process_file(
        &self,
        input: &Path,
        overrides: &ProcessOverrides,
        cancel: &CancelSignal,
    ) -> Result<FreezeReport, FreezeError> {
        info!("Processing file: {}", input.display());
        let job = self.plan(input, overrides)?;
        let counter = self.counter()?;

        let freezer = Freezer::with_parts(Arc::clone(&self.rasterizer), Arc::clone(counter))
            .with_font(self.font.clone())
            .with_progress(Arc::clone(&self.progress));

        match freezer.process(&job, cancel).await {
            Ok(report) => {
                info!("Success: {}", report.output.display());
                Ok(report)
            }
            Err(e) => {
                error!("Process failed: {e}");
                Err(e)
            }
        }
    }

    // ── Counter ───────────────────────────────────────────────────────────

    /// The number the next job will receive.
    pub fn current_number(&self) -> Result<u64, FreezeError> {
        self.counter()?.peek_next()
    }

    /// Make the next job receive `next` (must be ≥ 1).
    pub fn set_number_override(&self, next: u64) -> Result<(), FreezeError> {
        self.counter()?.set_override(next)
    }

    pub fn lock_counter(&self) -> Result<(), FreezeError> {
        self.counter()?.lock()
    }

    pub fn unlock_counter(&self) -> Result<(), FreezeError> {
        self.counter()?.unlock()
    }

    pub fn force_unlock_counter(&self) -> Result<(), FreezeError> {
        self.counter()?.force_unlock()
    }

    pub fn is_counter_locked(&self) -> Result<bool, FreezeError> {
        Ok(self.counter()?.is_locked())
    }

    // ── Settings ──────────────────────────────────────────────────────────

    /// Current settings, or the defaults when the store is unavailable.
    pub fn settings(&self) -> Settings {
        self.settings
            .as_ref()
            .map(SettingsStore::current)
            .unwrap_or_default()
    }

    pub fn set_prefix(&self, prefix: &str) -> Result<(), FreezeError> {
        info!("Prefix updated to: {prefix}");
        self.store()?.update_prefix(prefix)
    }

    pub fn set_overlay_position(&self, position: &str) -> Result<(), FreezeError> {
        info!("Position updated to: {position}");
        self.store()?.update_overlay_position(position)
    }

    pub fn set_compression_level(&self, level: &str) -> Result<(), FreezeError> {
        info!("Compression level updated to: {level}");
        self.store()?.update_compression_level(level)
    }

    pub fn set_overlay(&self, enabled: bool) -> Result<(), FreezeError> {
        self.store()?.update_overlay(enabled)
    }

    pub fn set_file_suffix(&self, suffix: &str) -> Result<(), FreezeError> {
        self.store()?.update_file_suffix(suffix)
    }

    pub fn set_overwrite_mode(&self, overwrite: bool) -> Result<(), FreezeError> {
        self.store()?.update_overwrite_mode(overwrite)
    }

    fn counter(&self) -> Result<&Arc<SequenceManager>, FreezeError> {
        self.counter
            .as_ref()
            .ok_or_else(|| FreezeError::Internal("counter not initialized".into()))
    }

    fn store(&self) -> Result<&SettingsStore, FreezeError> {
        self.settings
            .as_ref()
            .ok_or_else(|| FreezeError::Internal("settings not initialized".into()))
    }
}

/// `<dir>/<stem><suffix>.pdf`
fn sibling_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}.pdf"))
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}
