//! Content-addressed artifact store.
//!
//! One store per artifact category (integration grids, generated events).
//! Each cached artifact is a directory compressed into `<fingerprint>.zip`
//! under the category root, next to a shared `index.json` mapping
//! fingerprint to metadata. The index is updated by whole-file
//! read-modify-write with last-writer-wins semantics; at-most-one-build per
//! fingerprint is only a check-then-act guarantee, and distinct workers are
//! assumed to address distinct fingerprints (no cross-process lock).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use scan_core::{Component, ParameterPoint};

use crate::error::DriverError;

pub const INDEX_FILE: &str = "index.json";

/// Process name -> component -> event count.
pub type EventTotals = BTreeMap<String, BTreeMap<Component, u64>>;

/// Inverse-variance-weighted total cross section for one process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    pub value: f64,
    pub error: f64,
}

/// Index metadata for one cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub template: String,
    pub parameters: ParameterPoint,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cross_sections: BTreeMap<String, CrossSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub n_events: EventTotals,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a category store, creating its root on first use.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DriverError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| DriverError::io(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}.zip"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn exists(&self, fingerprint: &str) -> bool {
        self.archive_path(fingerprint).is_file()
    }

    /// Archive the contents of `source` as the artifact for `fingerprint`,
    /// replacing any previous archive.
    pub fn store(&self, fingerprint: &str, source: &Path) -> Result<(), DriverError> {
        let archive_path = self.archive_path(fingerprint);
        let file =
            File::create(&archive_path).map_err(|source| DriverError::io(&archive_path, source))?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in WalkDir::new(source).min_depth(1) {
            let entry = entry
                .map_err(|err| DriverError::io(source, io::Error::new(io::ErrorKind::Other, err)))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .expect("walked path is under its own root")
                .to_string_lossy()
                .into_owned();
            if entry.file_type().is_dir() {
                writer.add_directory(relative, options)?;
            } else {
                writer.start_file(relative, options)?;
                let mut input = File::open(entry.path())
                    .map_err(|source| DriverError::io(entry.path(), source))?;
                io::copy(&mut input, &mut writer)
                    .map_err(|source| DriverError::io(entry.path(), source))?;
            }
        }
        writer.finish()?;
        Ok(())
    }

    /// Unpack the artifact for `fingerprint` into `dest`.
    pub fn unpack(&self, fingerprint: &str, dest: &Path) -> Result<(), DriverError> {
        extract_archive(&self.archive_path(fingerprint), dest)
    }

    /// Delete the archive for `fingerprint` if present.
    pub fn remove(&self, fingerprint: &str) -> Result<(), DriverError> {
        let archive_path = self.archive_path(fingerprint);
        if archive_path.is_file() {
            fs::remove_file(&archive_path)
                .map_err(|source| DriverError::io(&archive_path, source))?;
        }
        Ok(())
    }

    pub fn read_index(&self) -> Result<BTreeMap<String, IndexRecord>, DriverError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&path).map_err(|source| DriverError::io(&path, source))?;
        serde_json::from_str(&text).map_err(|source| DriverError::Index { path, source })
    }

    pub fn write_index(&self, index: &BTreeMap<String, IndexRecord>) -> Result<(), DriverError> {
        let path = self.index_path();
        let text = serde_json::to_string_pretty(index).map_err(|source| DriverError::Index {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| DriverError::io(&path, source))
    }

    /// Whole-file read-modify-write of one index record.
    pub fn update_index(&self, fingerprint: &str, record: IndexRecord) -> Result<(), DriverError> {
        let mut index = self.read_index()?;
        index.insert(fingerprint.to_string(), record);
        self.write_index(&index)
    }
}

/// Extract any zip archive into `dest` (also used for library archives,
/// which are named by template rather than fingerprint).
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), DriverError> {
    let file = File::open(archive_path).map_err(|source| DriverError::io(archive_path, source))?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> ParameterPoint {
        let mut point = ParameterPoint::new();
        point.insert("c_hhh", 1.0);
        point.insert("scale", 1.0);
        point
    }

    fn sample_record() -> IndexRecord {
        IndexRecord {
            template: "vbf".to_string(),
            parameters: sample_point(),
            seed: 42,
            cross_sections: BTreeMap::new(),
            n_events: BTreeMap::new(),
        }
    }

    #[test]
    fn store_then_exists_then_unpack_round_trips_a_directory() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(workspace.path().join("Grids")).expect("store");

        let artifact = workspace.path().join("artifact");
        fs::create_dir_all(artifact.join("nested")).expect("mkdir");
        fs::write(artifact.join("grid.vg2"), "Integral = 1.0").expect("write");
        fs::write(artifact.join("nested/log.txt"), "ok").expect("write");

        let fp = "a".repeat(64);
        assert!(!store.exists(&fp));
        store.store(&fp, &artifact).expect("store should pass");
        assert!(store.exists(&fp));

        let dest = workspace.path().join("unpacked");
        store.unpack(&fp, &dest).expect("unpack should pass");
        assert_eq!(
            fs::read_to_string(dest.join("grid.vg2")).expect("read"),
            "Integral = 1.0"
        );
        assert_eq!(
            fs::read_to_string(dest.join("nested/log.txt")).expect("read"),
            "ok"
        );
    }

    #[test]
    fn index_read_modify_write_preserves_other_records() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(workspace.path()).expect("store");

        store.update_index("fp-1", sample_record()).expect("update");
        let mut second = sample_record();
        second.seed = 7;
        store.update_index("fp-2", second).expect("update");

        let index = store.read_index().expect("read");
        assert_eq!(index.len(), 2);
        assert_eq!(index["fp-1"].seed, 42);
        assert_eq!(index["fp-2"].seed, 7);
    }

    #[test]
    fn missing_index_reads_as_empty() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(workspace.path()).expect("store");
        assert!(store.read_index().expect("read").is_empty());
    }
}
