//! Configuration types for a freeze job.
//!
//! Every knob of a single job lives in [`FreezeJob`], built via its
//! [`FreezeJobBuilder`]. A job is constructed once per user action, executed
//! once, and never mutated afterwards; in particular the compression tier and
//! therefore the DPI/quality pair are fixed for every page of the job.
//!
//! The named presets ([`CompressionTier`], [`OverlayCorner`]) are lenient
//! when parsed from strings: unknown or empty names resolve to the default
//! preset instead of failing, because they usually come from a persisted
//! settings file written by another program.

use crate::error::FreezeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix used when neither the caller nor the settings provide one.
pub const DEFAULT_PREFIX: &str = "AR";

/// Format the serial label stamped on the first page.
///
/// The number is zero-padded to four digits and never truncated:
/// `("AR", 7)` → `"AR0007"`, `("AR", 12345)` → `"AR12345"`.
pub fn serial_label(prefix: &str, number: u64) -> String {
    format!("{prefix}{number:04}")
}

/// Resolution and JPEG quality handed to the rasteriser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    pub dpi: u32,
    pub quality: u8,
}

/// Named size/fidelity trade-off applied to every page of a job.
///
/// | Tier | DPI | JPEG quality |
/// |------|-----|--------------|
/// | `none` (default) | 300 | 95 |
/// | `low` | 200 | 85 |
/// | `medium` | 150 | 75 |
/// | `high` | 100 | 65 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CompressionTier {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl CompressionTier {
    pub const ALL: [CompressionTier; 4] = [
        CompressionTier::None,
        CompressionTier::Low,
        CompressionTier::Medium,
        CompressionTier::High,
    ];

    /// Resolve a tier name. Anything but the four exact names, including the
    /// empty string, resolves to [`CompressionTier::None`].
    pub fn resolve(name: &str) -> Self {
        match name {
            "low" => CompressionTier::Low,
            "medium" => CompressionTier::Medium,
            "high" => CompressionTier::High,
            _ => CompressionTier::None,
        }
    }

    /// `true` if `name` is one of the four tier names.
    pub fn is_known(name: &str) -> bool {
        Self::ALL.iter().any(|t| t.as_str() == name)
    }

    pub fn settings(self) -> TierSettings {
        match self {
            CompressionTier::None => TierSettings { dpi: 300, quality: 95 },
            CompressionTier::Low => TierSettings { dpi: 200, quality: 85 },
            CompressionTier::Medium => TierSettings { dpi: 150, quality: 75 },
            CompressionTier::High => TierSettings { dpi: 100, quality: 65 },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionTier::None => "none",
            CompressionTier::Low => "low",
            CompressionTier::Medium => "medium",
            CompressionTier::High => "high",
        }
    }
}

impl From<String> for CompressionTier {
    fn from(s: String) -> Self {
        Self::resolve(&s)
    }
}

impl fmt::Display for CompressionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page corner the serial label is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum OverlayCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl OverlayCorner {
    pub const ALL: [OverlayCorner; 4] = [
        OverlayCorner::TopLeft,
        OverlayCorner::TopRight,
        OverlayCorner::BottomLeft,
        OverlayCorner::BottomRight,
    ];

    /// Resolve a corner name; unknown or empty names mean `bottom-right`.
    pub fn resolve(name: &str) -> Self {
        match name {
            "top-left" => OverlayCorner::TopLeft,
            "top-right" => OverlayCorner::TopRight,
            "bottom-left" => OverlayCorner::BottomLeft,
            _ => OverlayCorner::BottomRight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayCorner::TopLeft => "top-left",
            OverlayCorner::TopRight => "top-right",
            OverlayCorner::BottomLeft => "bottom-left",
            OverlayCorner::BottomRight => "bottom-right",
        }
    }

    pub fn is_top(self) -> bool {
        matches!(self, OverlayCorner::TopLeft | OverlayCorner::TopRight)
    }

    pub fn is_right(self) -> bool {
        matches!(self, OverlayCorner::TopRight | OverlayCorner::BottomRight)
    }
}

impl From<String> for OverlayCorner {
    fn from(s: String) -> Self {
        Self::resolve(&s)
    }
}

impl fmt::Display for OverlayCorner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversion: which document, where to, and how to stamp it.
///
/// Built via [`FreezeJob::builder`].
///
/// # Example
/// ```rust
/// use pdf_freezer::{CompressionTier, FreezeJob, OverlayCorner};
///
/// let job = FreezeJob::builder("contract.pdf", "contract_frozen.pdf")
///     .prefix("INV")
///     .corner(OverlayCorner::TopRight)
///     .compression(CompressionTier::Medium)
///     .build()
///     .unwrap();
/// assert_eq!(job.tier_settings().dpi, 150);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeJob {
    /// Source PDF.
    pub input: PathBuf,

    /// Destination PDF. May equal `input` (overwrite mode); the source is
    /// fully rasterised before the destination is replaced.
    pub output: PathBuf,

    /// Stamp the serial label on the first page. Default: true.
    pub overlay: bool,

    /// Label prefix. Default: `"AR"`.
    pub prefix: String,

    /// Corner for the label. Default: bottom-right.
    pub corner: OverlayCorner,

    /// Resolution/quality preset. Default: none (300 DPI, quality 95).
    pub compression: CompressionTier,

    /// Upper bound on the rasterisation step. `None` waits indefinitely
    /// (the caller's cancellation signal still applies).
    pub rasterize_timeout: Option<Duration>,
}

impl FreezeJob {
    pub fn builder(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> FreezeJobBuilder {
        FreezeJobBuilder {
            job: FreezeJob {
                input: input.into(),
                output: output.into(),
                overlay: true,
                prefix: DEFAULT_PREFIX.to_string(),
                corner: OverlayCorner::default(),
                compression: CompressionTier::default(),
                rasterize_timeout: None,
            },
        }
    }

    pub fn tier_settings(&self) -> TierSettings {
        self.compression.settings()
    }

    /// The label this job stamps for serial `number`, falling back to the
    /// default prefix when the job's prefix is empty.
    pub fn label_for(&self, number: u64) -> String {
        if self.prefix.is_empty() {
            serial_label(DEFAULT_PREFIX, number)
        } else {
            serial_label(&self.prefix, number)
        }
    }
}

/// Builder for [`FreezeJob`].
#[derive(Debug)]
pub struct FreezeJobBuilder {
    job: FreezeJob,
}

impl FreezeJobBuilder {
    pub fn overlay(mut self, enabled: bool) -> Self {
        self.job.overlay = enabled;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job.prefix = prefix.into();
        self
    }

    pub fn corner(mut self, corner: OverlayCorner) -> Self {
        self.job.corner = corner;
        self
    }

    pub fn compression(mut self, tier: CompressionTier) -> Self {
        self.job.compression = tier;
        self
    }

    pub fn rasterize_timeout(mut self, timeout: Duration) -> Self {
        self.job.rasterize_timeout = Some(timeout);
        self
    }

    /// Build the job, validating the paths.
    pub fn build(self) -> Result<FreezeJob, FreezeError> {
        let j = &self.job;
        if j.input.as_os_str().is_empty() {
            return Err(FreezeError::InvalidInput("no input file selected".into()));
        }
        if j.output.as_os_str().is_empty() {
            return Err(FreezeError::InvalidConfig("output path is empty".into()));
        }
        if j.rasterize_timeout == Some(Duration::ZERO) {
            return Err(FreezeError::InvalidConfig(
                "rasterize timeout must be > 0".into(),
            ));
        }
        Ok(self.job)
    }
}
