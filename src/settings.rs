//! Persisted user settings and the application data directory.
//!
//! The settings record is owned by whatever front end edits it (the CLI's
//! `config set`, or a GUI); the core only reads it once per job as an
//! immutable [`Settings`] value. Loading never blocks startup: a missing or
//! unreadable `config.json` yields [`Settings::default`].

use crate::config::{CompressionTier, OverlayCorner, DEFAULT_PREFIX};
use crate::error::FreezeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PDF_FREEZER_DIR";

/// Default output suffix when not overwriting: `report.pdf` → `report_frozen.pdf`.
pub const DEFAULT_SUFFIX: &str = "_frozen";

const APP_DIR_NAME: &str = "pdf-freezer";
const SETTINGS_FILE: &str = "config.json";

/// Directory holding `config.json`, `counter.json`, `counter.lock` and `app.log`.
///
/// - `PDF_FREEZER_DIR` if set
/// - otherwise `<config dir>/pdf-freezer` (`~/.config/pdf-freezer` on Linux,
///   `~/Library/Application Support/pdf-freezer` on macOS,
///   `%APPDATA%\pdf-freezer` on Windows)
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(std::env::temp_dir);
    base.join(APP_DIR_NAME)
}

/// Persisted application settings.
///
/// Every field has a default so partially written files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial label prefix.
    pub prefix: String,
    /// Stamp the serial label on the first page.
    pub overlay: bool,
    /// Stored for the settings UI; the stamp colour is always red.
    pub overlay_color: String,
    pub overlay_position: OverlayCorner,
    /// Appended to the file stem when not overwriting.
    pub file_suffix: String,
    /// Replace the input file instead of writing `<stem><suffix>.pdf`.
    pub overwrite_mode: bool,
    pub compression_level: CompressionTier,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            overlay: true,
            overlay_color: "#FF0000".to_string(),
            overlay_position: OverlayCorner::BottomRight,
            file_suffix: DEFAULT_SUFFIX.to_string(),
            overwrite_mode: false,
            compression_level: CompressionTier::None,
        }
    }
}

/// Load/save wrapper around [`Settings`] stored as pretty-printed JSON.
///
/// Each `update_*` call mutates the in-memory copy and saves immediately.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// If the file is missing or unreadable the defaults are used and written
    /// back (best effort; a failed write is only logged).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FreezeError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| FreezeError::Settings {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;

        let store = Self {
            path: dir.join(SETTINGS_FILE),
            current: RwLock::new(Settings::default()),
        };

        if let Err(e) = store.load() {
            debug!("Settings not loaded ({e}); using defaults");
            if let Err(e) = store.save() {
                warn!("Could not write default settings: {e}");
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory copy on success.
    pub fn load(&self) -> Result<(), FreezeError> {
        let data = std::fs::read(&self.path).map_err(|e| self.err(e))?;
        let parsed: Settings = serde_json::from_slice(&data).map_err(|e| self.err(e))?;
        *self.write_guard() = parsed;
        Ok(())
    }

    /// Write the in-memory copy to disk.
    pub fn save(&self) -> Result<(), FreezeError> {
        let data = serde_json::to_vec_pretty(&self.current()).map_err(|e| self.err(e))?;
        std::fs::write(&self.path, data).map_err(|e| self.err(e))
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Settings {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_prefix(&self, prefix: impl Into<String>) -> Result<(), FreezeError> {
        self.update(|s| s.prefix = prefix.into())
    }

    pub fn update_overlay(&self, enabled: bool) -> Result<(), FreezeError> {
        self.update(|s| s.overlay = enabled)
    }

    pub fn update_overlay_position(&self, position: &str) -> Result<(), FreezeError> {
        self.update(|s| s.overlay_position = OverlayCorner::resolve(position))
    }

    /// Unknown level names are stored as `none`.
    pub fn update_compression_level(&self, level: &str) -> Result<(), FreezeError> {
        self.update(|s| s.compression_level = CompressionTier::resolve(level))
    }

    pub fn update_file_suffix(&self, suffix: impl Into<String>) -> Result<(), FreezeError> {
        self.update(|s| s.file_suffix = suffix.into())
    }

    pub fn update_overwrite_mode(&self, overwrite: bool) -> Result<(), FreezeError> {
        self.update(|s| s.overwrite_mode = overwrite)
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<(), FreezeError> {
        f(&mut self.write_guard());
        self.save()
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn err(&self, e: impl ToString) -> FreezeError {
        FreezeError::Settings {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(store.current(), Settings::default());
        assert!(store.path().exists(), "defaults should be written back");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), b"{not json").unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(store.current(), Settings::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            br#"{"prefix":"INV","compression_level":"ultra","overlay_position":"top-left"}"#,
        )
        .unwrap();
        let s = SettingsStore::open(dir.path()).unwrap().current();
        assert_eq!(s.prefix, "INV");
        assert_eq!(s.compression_level, CompressionTier::None);
        assert_eq!(s.overlay_position, OverlayCorner::TopLeft);
        assert_eq!(s.file_suffix, DEFAULT_SUFFIX);
        assert!(s.overlay);
    }

    #[test]
    fn updates_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SettingsStore::open(dir.path()).unwrap();
            store.update_prefix("TEST").unwrap();
            store.update_overlay_position("top-right").unwrap();
            store.update_compression_level("medium").unwrap();
            store.update_overwrite_mode(true).unwrap();
        }
        let s = SettingsStore::open(dir.path()).unwrap().current();
        assert_eq!(s.prefix, "TEST");
        assert_eq!(s.overlay_position, OverlayCorner::TopRight);
        assert_eq!(s.compression_level, CompressionTier::Medium);
        assert!(s.overwrite_mode);
    }

    #[test]
    fn invalid_compression_level_stored_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        store.update_compression_level("high").unwrap();
        store.update_compression_level("extreme").unwrap();
        assert_eq!(store.current().compression_level, CompressionTier::None);
    }

    #[test]
    fn file_format_uses_snake_case_keys() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["overlay_position"], "bottom-right");
        assert_eq!(json["compression_level"], "none");
        assert_eq!(json["overlay_color"], "#FF0000");
        assert_eq!(json["file_suffix"], "_frozen");
    }
}
