//! Accumulated event-sample manifest.
//!
//! A single events fingerprint may be fed by multiple independent runs
//! with different seeds. The manifest inside the archive keeps per-seed
//! sample bookkeeping plus running per-process/component totals, so each
//! new run merges into the accumulated artifact instead of replacing it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use scan_core::{ParameterPoint, ProcessDescriptor};

use crate::cache::EventTotals;
use crate::error::DriverError;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub template: String,
    pub parameters: ParameterPoint,
    pub processes: Vec<String>,
    /// Running totals across all recorded runs.
    pub n_events: EventTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    /// Per-run event counts, keyed by the run seed.
    pub samples: std::collections::BTreeMap<String, EventTotals>,
}

impl Manifest {
    pub fn new(template: &str, parameters: ParameterPoint, descriptor: &ProcessDescriptor) -> Self {
        Self {
            metadata: ManifestMetadata {
                template: template.to_string(),
                parameters,
                processes: descriptor.keys().cloned().collect(),
                n_events: EventTotals::new(),
            },
            samples: std::collections::BTreeMap::new(),
        }
    }

    /// Load the manifest from an unpacked artifact directory, if present.
    pub fn load(dir: &Path) -> Result<Option<Self>, DriverError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| DriverError::io(&path, source))?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| DriverError::Index { path, source })
    }

    pub fn save(&self, dir: &Path) -> Result<(), DriverError> {
        let path = dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(self).map_err(|source| DriverError::Index {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| DriverError::io(&path, source))
    }

    /// Merge one run's counts: sum into the totals and record the sample.
    pub fn record_run(&mut self, seed: u64, counts: EventTotals) {
        for (process, components) in &counts {
            let totals = self
                .metadata
                .n_events
                .entry(process.clone())
                .or_default();
            for (component, count) in components {
                *totals.entry(*component).or_insert(0) += count;
            }
        }
        self.samples.insert(seed.to_string(), counts);
    }

    pub fn totals(&self) -> &EventTotals {
        &self.metadata.n_events
    }
}

/// Per-run event counts derived from the descriptor's expected counts.
pub fn expected_counts(descriptor: &ProcessDescriptor) -> EventTotals {
    descriptor
        .iter()
        .map(|(process, components)| {
            (
                process.clone(),
                components
                    .iter()
                    .map(|(component, info)| (*component, info.expected_events))
                    .collect(),
            )
        })
        .collect()
}
