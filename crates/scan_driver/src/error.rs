use std::path::PathBuf;

use thiserror::Error;

use scan_core::{DescriptorError, ParseError};

/// Failure taxonomy of the scan driver. None of these are retried; every
/// failure terminates the invocation and requires operator intervention.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Descriptor failures are scoped to one template; the template name is
    /// carried so unrelated templates are not implicated.
    #[error("template '{template}': {source}")]
    Descriptor {
        template: String,
        #[source]
        source: DescriptorError,
    },

    #[error("external runner exited with status {status}, output captured in '{}'", log.display())]
    RunnerFailure { status: i32, log: PathBuf },

    #[error("the field 'submit_command' is required to run in cluster mode")]
    SubmissionConfiguration,

    #[error("unable to find '{}', did you run 'install' yet?", path.display())]
    MissingInstallation { path: PathBuf },

    #[error("rendered control-text does not declare '$integrate_workspace'")]
    MissingIntegrateWorkspace,

    #[error("rendered control-text does not declare '$compile_workspace'")]
    MissingCompileWorkspace,

    #[error("no cached grid archive for fingerprint '{fingerprint}', run 'integrate' first")]
    MissingGrid { fingerprint: String },

    #[error("parameter index {index} is out of range for {count} expanded points")]
    PointIndexOutOfRange { index: usize, count: usize },

    #[error("I/O failure at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive failure: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("index file '{}' is corrupt: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration file '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

impl DriverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }
}
