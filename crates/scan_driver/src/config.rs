//! Run-configuration document.
//!
//! A TOML document with a `parameters` table (scalar, list, or
//! `start:stop:step` text per axis), an optional list of pre-existing
//! explicit parameter combinations, and scan-wide settings such as the
//! cluster submission command.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use scan_core::{AxisSpec, ParameterPoint, ParameterSpace};

use crate::error::DriverError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Cluster submission command with a `{}` placeholder for the worker
    /// invocation. Required only in cluster mode.
    #[serde(default)]
    pub submit_command: Option<String>,
    /// Declared parameter axes.
    #[serde(default)]
    pub parameters: BTreeMap<String, AxisSpec>,
    /// Pre-existing explicit parameter combinations, merged ahead of the
    /// expanded Cartesian product.
    #[serde(default)]
    pub points: Vec<ParameterPoint>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let text = fs::read_to_string(path).map_err(|source| DriverError::io(path, source))?;
        toml::from_str(&text).map_err(|source| DriverError::Config {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Load the document when a path is given, otherwise an empty config.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, DriverError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parameter_space(&self) -> ParameterSpace {
        ParameterSpace {
            axes: self.parameters.clone(),
            points: self.points.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::expand;

    #[test]
    fn parses_axes_points_and_submit_command() {
        let config: RunConfig = toml::from_str(
            r#"
submit_command = "sbatch --wrap '{}'"

[parameters]
c_hhh = "0:2:1"
c_hhv = [0.5, 1.0]
fixed = 3.5

[[points]]
c_hhh = 9.0
c_hhv = 9.0
fixed = 9.0
"#,
        )
        .expect("config should parse");

        assert_eq!(config.submit_command.as_deref(), Some("sbatch --wrap '{}'"));
        assert_eq!(config.parameters.len(), 3);
        assert_eq!(config.points.len(), 1);

        let jobs = expand(&config.parameter_space(), &[]).expect("expansion should pass");
        // 1 explicit point + 3 * 2 * 1 expanded, times the default scale.
        assert_eq!(jobs.len(), 7);
        assert_eq!(jobs[0].get("c_hhh"), Some(9.0));
    }

    #[test]
    fn integer_axis_values_deserialize_as_floats() {
        let config: RunConfig = toml::from_str(
            r#"
[parameters]
c_hhh = 2
c_hhv = [1, 2]
"#,
        )
        .expect("config should parse");
        assert_eq!(config.parameters["c_hhh"], AxisSpec::Fixed(2.0));
        assert_eq!(config.parameters["c_hhv"], AxisSpec::List(vec![1.0, 2.0]));
    }
}
