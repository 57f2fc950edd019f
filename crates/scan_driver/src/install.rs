//! Persisted installation-info record.
//!
//! The installer (an external collaborator) writes `installation.json`
//! next to the scan root; the driver only ever reads it to locate the
//! external runner's binary and to learn which optional features the
//! toolchain was built with.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

pub const INSTALL_INFO_FILE: &str = "installation.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallInfo {
    /// Absolute install prefix of the simulation toolchain.
    pub prefix: PathBuf,
    /// Whether the runner was built with MPI support.
    #[serde(default)]
    pub mpi: bool,
}

impl InstallInfo {
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        if !path.exists() {
            return Err(DriverError::MissingInstallation {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| DriverError::io(path, source))?;
        serde_json::from_str(&text).map_err(|source| DriverError::Index {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Path of an installed binary under the toolchain prefix.
    pub fn binary(&self, name: &str) -> PathBuf {
        self.prefix.join("bin").join(name)
    }
}
