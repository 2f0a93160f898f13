//! PDF rasterisation: turn every page of a PDF into a JPEG via Ghostscript.
//!
//! ## Why a trait?
//!
//! Ghostscript is an external process that is slow and often absent on CI
//! machines. The orchestrator is generic over [`Rasterizer`] so tests can
//! substitute a double that writes canned `page-N.jpg` files into the output
//! directory.
//!
//! ## Why sort numerically?
//!
//! Ghostscript names its output `page-1.jpg`, `page-2.jpg`, …, `page-10.jpg`
//! without zero padding. A lexicographic sort would put page 10 before page
//! 2, so file names are parsed and ordered by the embedded page number.

use crate::cancel::CancelSignal;
use crate::config::TierSettings;
use crate::error::FreezeError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `page-%d.jpg`, the output pattern handed to Ghostscript.
pub const PAGE_PATTERN: &str = "page-%d.jpg";

static PAGE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page-(\d+)\.jpg$").unwrap());

/// One rasterised page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based position in the source document.
    pub number: usize,
    pub path: PathBuf,
    /// Resolution the page was rendered at.
    pub dpi: u32,
}

/// Something that can turn a PDF into ordered page images.
pub trait Rasterizer: Send + Sync {
    /// Verify the engine is present and runnable.
    fn check(&self) -> impl Future<Output = Result<(), FreezeError>> + Send;

    /// Rasterise every page of `source` into `out_dir`, returning the pages
    /// in document order. An empty vector means the engine succeeded but
    /// produced nothing.
    fn extract_pages(
        &self,
        source: &Path,
        out_dir: &Path,
        settings: TierSettings,
        cancel: &CancelSignal,
    ) -> impl Future<Output = Result<Vec<PageImage>, FreezeError>> + Send;
}

/// Shared rasterisers, so one engine handle can back several freezers.
impl<R: Rasterizer> Rasterizer for Arc<R> {
    fn check(&self) -> impl Future<Output = Result<(), FreezeError>> + Send {
        (**self).check()
    }

    fn extract_pages(
        &self,
        source: &Path,
        out_dir: &Path,
        settings: TierSettings,
        cancel: &CancelSignal,
    ) -> impl Future<Output = Result<Vec<PageImage>, FreezeError>> + Send {
        (**self).extract_pages(source, out_dir, settings, cancel)
    }
}

/// [`Rasterizer`] backed by the Ghostscript `jpeg` device.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    executable: PathBuf,
}

impl Default for Ghostscript {
    fn default() -> Self {
        Self::new()
    }
}

impl Ghostscript {
    /// Use the executable found by [`gs_locate::ghostscript`].
    pub fn new() -> Self {
        let located = gs_locate::ghostscript();
        debug!(
            "Ghostscript resolved to {} ({:?})",
            located.path.display(),
            located.origin
        );
        Self {
            executable: located.path.clone(),
        }
    }

    /// Use an explicit executable.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn missing(&self, detail: impl ToString) -> FreezeError {
        FreezeError::DependencyMissing {
            executable: self.executable.clone(),
            detail: detail.to_string(),
        }
    }
}

impl Rasterizer for Ghostscript {
    async fn check(&self) -> Result<(), FreezeError> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.missing(e))?;

        if !output.status.success() {
            return Err(self.missing(format!(
                "`--version` exited with {}",
                output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Ghostscript version {version}");
        Ok(())
    }

    async fn extract_pages(
        &self,
        source: &Path,
        out_dir: &Path,
        settings: TierSettings,
        cancel: &CancelSignal,
    ) -> Result<Vec<PageImage>, FreezeError> {
        let source = std::path::absolute(source)
            .map_err(|e| FreezeError::InvalidInput(format!("{}: {e}", source.display())))?;
        let out_dir = std::path::absolute(out_dir)
            .map_err(|e| FreezeError::Internal(format!("{}: {e}", out_dir.display())))?;

        let args = ghostscript_args(&source, &out_dir, settings);
        info!(
            "Rasterising {} at {} DPI, quality {}",
            source.display(),
            settings.dpi,
            settings.quality
        );

        let mut cmd = Command::new(&self.executable);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the `output()` future kills the child.
        let output = tokio::select! {
            res = cmd.output() => res.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.missing(e)
                } else {
                    FreezeError::Rasterization {
                        detail: format!("could not start Ghostscript: {e}"),
                        output: String::new(),
                    }
                }
            })?,
            reason = cancel.cancelled() => {
                warn!("Rasterisation aborted: {reason}");
                return Err(FreezeError::Cancelled { reason: reason.to_string() });
            }
        };

        if !output.status.success() {
            return Err(FreezeError::Rasterization {
                detail: match output.status.code() {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                },
                output: combined_output(&output.stdout, &output.stderr),
            });
        }

        collect_pages(&out_dir, settings.dpi)
    }
}

/// Command-line arguments for one extraction, source path last.
pub fn ghostscript_args(source: &Path, out_dir: &Path, settings: TierSettings) -> Vec<OsString> {
    let mut output_file = OsString::from("-sOutputFile=");
    output_file.push(out_dir.join(PAGE_PATTERN));

    vec![
        "-dNOPAUSE".into(),
        "-dBATCH".into(),
        "-dSAFER".into(),
        "-sDEVICE=jpeg".into(),
        format!("-dJPEGQ={}", settings.quality).into(),
        format!("-r{}", settings.dpi).into(),
        output_file,
        source.as_os_str().to_owned(),
    ]
}

/// Scan `dir` for `page-<N>.jpg` files and return them in page order.
///
/// Other files are ignored. The page numbers must form the contiguous run
/// `1..=n`; a gap or duplicate means the engine output is unusable.
pub fn collect_pages(dir: &Path, dpi: u32) -> Result<Vec<PageImage>, FreezeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| FreezeError::Rasterization {
        detail: format!("cannot read output directory {}: {e}", dir.display()),
        output: String::new(),
    })?;

    let mut pages: Vec<PageImage> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(number) = name.to_str().and_then(page_number) else {
            continue;
        };
        pages.push(PageImage {
            number,
            path: entry.path(),
            dpi,
        });
    }
    pages.sort_by_key(|p| p.number);

    for (i, page) in pages.iter().enumerate() {
        if page.number != i + 1 {
            return Err(FreezeError::Rasterization {
                detail: format!(
                    "page images are not contiguous: expected page {}, found {}",
                    i + 1,
                    page.path.display()
                ),
                output: String::new(),
            });
        }
    }

    debug!("Found {} page images in {}", pages.len(), dir.display());
    Ok(pages)
}

/// Page number embedded in a `page-<N>.jpg` file name.
fn page_number(file_name: &str) -> Option<usize> {
    PAGE_FILE
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    match (out.trim().is_empty(), err.trim().is_empty()) {
        (true, _) => err.trim().to_string(),
        (false, true) => out.trim().to_string(),
        (false, false) => format!("{}\n{}", out.trim(), err.trim()),
    }
}
