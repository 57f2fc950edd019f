//! Derived statistics from integration grid output.
//!
//! Each per-component grid file reports `Integral = …` and `Error = …`
//! lines; the per-process total cross section is their inverse-variance
//! weighted combination. These numbers are advisory (logged and stored in
//! the index record); a grid file that cannot be read or parsed is skipped
//! with a warning rather than failing the batch.

use std::fs;
use std::path::Path;

use std::collections::BTreeMap;

use tracing::warn;

use scan_core::ProcessDescriptor;

use crate::cache::CrossSection;

/// Scalar value of a `key = value` line, scanning line by line.
fn scan_value(text: &str, key: &str) -> Option<f64> {
    for line in text.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(key) {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                return value.trim().parse::<f64>().ok();
            }
        }
    }
    None
}

/// Integral and error reported by one grid file.
pub fn parse_grid_stats(text: &str) -> Option<CrossSection> {
    Some(CrossSection {
        value: scan_value(text, "Integral")?,
        error: scan_value(text, "Error")?,
    })
}

/// Inverse-variance weighted combination of component cross sections.
pub fn combine(components: &[CrossSection]) -> Option<CrossSection> {
    if components.is_empty() || components.iter().any(|c| c.error == 0.0) {
        return None;
    }
    let variance = 1.0 / components.iter().map(|c| 1.0 / (c.error * c.error)).sum::<f64>();
    let value = components
        .iter()
        .map(|c| c.value / (c.error * c.error))
        .sum::<f64>()
        * variance;
    Some(CrossSection {
        value,
        error: variance.sqrt(),
    })
}

/// Combined total cross section per process, read from the per-component
/// grid files `<internal_name>.m<k>.vg2` inside the grid workspace.
pub fn collect_cross_sections(
    grid_dir: &Path,
    descriptor: &ProcessDescriptor,
) -> BTreeMap<String, CrossSection> {
    let mut sections = BTreeMap::new();
    for (process, components) in descriptor {
        let mut parts = Vec::new();
        for (component, info) in components {
            let path = grid_dir.join(format!(
                "{}.m{}.vg2",
                info.internal_name,
                component.grid_ordinal()
            ));
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(error) => {
                    warn!(path = %path.display(), %error, "unable to read grid file");
                    continue;
                }
            };
            match parse_grid_stats(&text) {
                Some(stats) => parts.push(stats),
                None => warn!(path = %path.display(), "grid file lacks Integral/Error lines"),
            }
        }
        if let Some(combined) = combine(&parts) {
            sections.insert(process.clone(), combined);
        }
    }
    sections
}
