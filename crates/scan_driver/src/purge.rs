//! Purge cached grids (and optionally the process library) for a template.

use std::fs;

use tracing::info;

use crate::cache::ArtifactStore;
use crate::error::DriverError;
use crate::layout::{template_stem, Layout};

/// Remove every grid archive whose index record belongs to `template`,
/// dropping the matching index entries. With `library` set, the template's
/// process-library archive goes too.
pub fn purge(layout: &Layout, template: &str, library: bool) -> Result<(), DriverError> {
    let template_name = template_stem(template);
    if library {
        info!(template = template_name, "purging process library and grids");
        let archive = layout.library_archive(template_name);
        if archive.is_file() {
            fs::remove_file(&archive).map_err(|source| DriverError::io(&archive, source))?;
        }
    } else {
        info!(template = template_name, "purging grids");
    }

    let grids = ArtifactStore::open(layout.grids_dir())?;
    let mut index = grids.read_index()?;
    let doomed: Vec<String> = index
        .iter()
        .filter(|(_, record)| record.template == template_name)
        .map(|(fingerprint, _)| fingerprint.clone())
        .collect();
    for fingerprint in &doomed {
        grids.remove(fingerprint)?;
        index.remove(fingerprint);
    }
    grids.write_index(&index)?;
    info!(template = template_name, removed = doomed.len(), "purge finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::cache::IndexRecord;
    use scan_core::ParameterPoint;

    fn record(template: &str) -> IndexRecord {
        IndexRecord {
            template: template.to_string(),
            parameters: ParameterPoint::new(),
            seed: 1,
            cross_sections: BTreeMap::new(),
            n_events: BTreeMap::new(),
        }
    }

    #[test]
    fn removes_only_the_named_templates_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let grids = ArtifactStore::open(layout.grids_dir()).expect("store");

        let artifact = dir.path().join("artifact");
        fs::create_dir_all(&artifact).expect("mkdir");
        fs::write(artifact.join("file"), "x").expect("write");

        grids.store("fp-vbf", &artifact).expect("store");
        grids.update_index("fp-vbf", record("vbf")).expect("update");
        grids.store("fp-other", &artifact).expect("store");
        grids.update_index("fp-other", record("other")).expect("update");

        purge(&layout, "vbf.sin", false).expect("purge should pass");

        assert!(!grids.exists("fp-vbf"));
        assert!(grids.exists("fp-other"));
        let index = grids.read_index().expect("index");
        assert!(!index.contains_key("fp-vbf"));
        assert!(index.contains_key("fp-other"));
    }

    #[test]
    fn library_flag_also_removes_the_library_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        fs::create_dir_all(layout.libraries_dir()).expect("mkdir");
        fs::write(layout.library_archive("vbf"), "zip").expect("write");

        purge(&layout, "vbf.sin", true).expect("purge should pass");
        assert!(!layout.library_archive("vbf").exists());
    }
}
