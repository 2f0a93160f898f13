//! # gs-locate
//!
//! Find a [Ghostscript](https://www.ghostscript.com/) executable without
//! relying on the caller's shell environment.
//!
//! ## Why not just run `gs`?
//!
//! Applications launched from a desktop launcher (Finder, a .desktop file,
//! the Start menu) frequently do not inherit the login shell's `PATH`. A
//! Homebrew install at `/opt/homebrew/bin/gs` is then invisible to a plain
//! `Command::new("gs")`. This crate checks the well-known install locations
//! first and only then consults `PATH`.
//!
//! ## Search order
//!
//! 1. `PDF_FREEZER_GS`: explicit path to an executable (skipped if missing).
//! 2. Fixed install paths for the current platform.
//! 3. Every candidate binary name in every `PATH` directory.
//!    On Windows the `%ProgramFiles%\gs\gs*\bin` directories are scanned too.
//! 4. The bare name `gs`, deferring failure to invocation time.
//!
//! ## Usage
//!
//! ```rust,no_run
//! let located = gs_locate::ghostscript();
//! println!("using {} ({:?})", located.path.display(), located.origin);
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable pinning the executable to an explicit path.
pub const ENV_OVERRIDE: &str = "PDF_FREEZER_GS";

/// Name used when nothing else is found.
pub const FALLBACK_NAME: &str = "gs";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by [`locate_strict`].
#[derive(Error, Debug)]
pub enum LocateError {
    /// No candidate exists on disk; only the bare fallback name is left.
    #[error(
        "Ghostscript executable not found.\n\
         Searched: {searched}\n\
         Install Ghostscript or set PDF_FREEZER_GS=/path/to/gs"
    )]
    NotFound { searched: String },
}

// ── Search results ───────────────────────────────────────────────────────────

/// Where a located executable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// `PDF_FREEZER_GS` pointed at an existing file.
    Override,
    /// One of the platform's fixed install paths.
    FixedPath,
    /// Found by scanning the directories on `PATH`.
    SearchPath,
    /// Nothing found; the bare name is returned.
    Fallback,
}

/// A resolved executable path plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub origin: Origin,
}

impl Located {
    /// `true` unless the bare fallback name was returned.
    pub fn is_found(&self) -> bool {
        self.origin != Origin::Fallback
    }
}

/// Inputs of a search. [`SearchSpec::from_env`] captures the live process
/// environment; tests build one by hand.
#[derive(Debug, Clone, Default)]
pub struct SearchSpec {
    pub override_path: Option<OsString>,
    pub fixed_paths: Vec<PathBuf>,
    pub names: Vec<&'static str>,
    pub path_var: Option<OsString>,
}

impl SearchSpec {
    /// Candidates for the current platform and the current environment.
    pub fn from_env() -> Self {
        let mut fixed_paths: Vec<PathBuf> = FIXED_PATHS.iter().map(PathBuf::from).collect();
        fixed_paths.extend(program_files_candidates());
        Self {
            override_path: std::env::var_os(ENV_OVERRIDE),
            fixed_paths,
            names: CANDIDATE_NAMES.to_vec(),
            path_var: std::env::var_os("PATH"),
        }
    }

    fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .fixed_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        parts.push(format!("PATH for {}", self.names.join(", ")));
        parts.join("; ")
    }
}

// ── Internal: platform candidates ────────────────────────────────────────────

#[cfg(not(windows))]
const FIXED_PATHS: &[&str] = &[
    "/usr/local/bin/gs",
    "/opt/homebrew/bin/gs",
    "/usr/bin/gs",
    "/opt/local/bin/gs",
];

#[cfg(windows)]
const FIXED_PATHS: &[&str] = &[];

#[cfg(not(windows))]
const CANDIDATE_NAMES: &[&str] = &["gs", "gswin64c.exe", "gswin32c.exe"];

#[cfg(windows)]
const CANDIDATE_NAMES: &[&str] = &["gswin64c.exe", "gswin32c.exe", "gs.exe"];

/// `%ProgramFiles%\gs\gs<version>\bin\gswin64c.exe`, newest version first.
#[cfg(windows)]
fn program_files_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    for var in ["ProgramFiles", "ProgramFiles(x86)"] {
        let Some(root) = std::env::var_os(var) else {
            continue;
        };
        let Ok(entries) = std::fs::read_dir(Path::new(&root).join("gs")) else {
            continue;
        };
        let mut versions: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        versions.sort();
        versions.reverse();
        for dir in versions {
            out.push(dir.join("bin").join("gswin64c.exe"));
            out.push(dir.join("bin").join("gswin32c.exe"));
        }
    }
    out
}

#[cfg(not(windows))]
fn program_files_candidates() -> Vec<PathBuf> {
    Vec::new()
}

// ── Cached singleton ─────────────────────────────────────────────────────────

static RESOLVED: OnceLock<Located> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate Ghostscript once per process and cache the answer.
pub fn ghostscript() -> &'static Located {
    RESOLVED.get_or_init(locate)
}

/// Locate Ghostscript using the live environment. Never fails; see
/// [`Origin::Fallback`].
pub fn locate() -> Located {
    locate_with(&SearchSpec::from_env())
}

/// Like [`locate`] but reports a miss as an error instead of returning the
/// bare fallback name.
pub fn locate_strict() -> Result<Located, LocateError> {
    let spec = SearchSpec::from_env();
    let located = locate_with(&spec);
    if located.is_found() {
        Ok(located)
    } else {
        Err(LocateError::NotFound {
            searched: spec.describe(),
        })
    }
}

/// Run the search against an explicit [`SearchSpec`].
pub fn locate_with(spec: &SearchSpec) -> Located {
    // 1. Environment override.
    if let Some(ref p) = spec.override_path {
        let p = PathBuf::from(p);
        if p.is_file() {
            return Located {
                path: p,
                origin: Origin::Override,
            };
        }
    }

    // 2. Fixed install locations.
    if let Some(p) = spec.fixed_paths.iter().find(|p| p.is_file()) {
        return Located {
            path: p.clone(),
            origin: Origin::FixedPath,
        };
    }

    // 3. PATH lookup, every name in priority order.
    if let Some(ref path_var) = spec.path_var {
        for name in &spec.names {
            if let Some(p) = search_path(path_var, name) {
                return Located {
                    path: p,
                    origin: Origin::SearchPath,
                };
            }
        }
    }

    // 4. Bare name.
    Located {
        path: PathBuf::from(FALLBACK_NAME),
        origin: Origin::Fallback,
    }
}

/// First `dir/name` that exists as a regular file across `PATH` entries.
fn search_path(path_var: &OsStr, name: &str) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
