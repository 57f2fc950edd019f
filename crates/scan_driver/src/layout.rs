//! Explicit filesystem layout of a scan workspace.
//!
//! Every operation receives the paths it touches through this struct; no
//! component reads or mutates the process-wide working directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DriverError;
use crate::install::INSTALL_INFO_FILE;

/// Artifact categories, one cache root per category.
pub const GRIDS_DIR: &str = "Grids";
pub const EVENTS_DIR: &str = "Events";
pub const LIBRARIES_DIR: &str = "Libraries";
pub const TEMPLATES_DIR: &str = "Templates";
pub const MODEL_DIR: &str = "Model";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn grids_dir(&self) -> PathBuf {
        self.root.join(GRIDS_DIR)
    }

    pub fn events_dir(&self) -> PathBuf {
        self.root.join(EVENTS_DIR)
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join(LIBRARIES_DIR)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(MODEL_DIR)
    }

    pub fn template_path(&self, template: &str) -> PathBuf {
        self.root.join(TEMPLATES_DIR).join(template)
    }

    /// Library archive for a template, if one has been generated.
    pub fn library_archive(&self, template_name: &str) -> PathBuf {
        self.libraries_dir().join(format!("{template_name}.zip"))
    }

    pub fn install_info_path(&self) -> PathBuf {
        self.root.join(INSTALL_INFO_FILE)
    }

    /// Captured external-runner log, surfaced to the operator on failure.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Per-ordinal completion sentinel dropped by remote workers.
    pub fn sentinel_path(&self, index: usize) -> PathBuf {
        self.events_dir().join(format!("{index}.stamp"))
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<(), DriverError> {
        fs::create_dir_all(dir).map_err(|source| DriverError::io(dir, source))
    }
}

/// Strip the extension from a template file name: `vbf.sin` -> `vbf`.
pub fn template_stem(template: &str) -> &str {
    Path::new(template)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(template)
}
