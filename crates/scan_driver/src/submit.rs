//! Cluster job submission.
//!
//! One external submission per pending ordinal index; the submitted worker
//! re-expands the parameter list on its own and resolves "which point am I"
//! from the index alone. Once submitted, a job cannot be cancelled from
//! here; stray remote jobs are the operator's to terminate.

use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::DriverError;

/// Placeholder in the worker command replaced by the ordinal index.
pub const ORDINAL_PLACEHOLDER: &str = "{id}";
/// Placeholder in `submit_command` replaced by the worker invocation.
pub const COMMAND_PLACEHOLDER: &str = "{}";

pub trait JobSubmitter {
    fn submit(&self, ordinal: usize) -> Result<(), DriverError>;
}

/// Shells out to the configured `submit_command`.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    submit_template: String,
    worker_command: String,
}

impl CommandSubmitter {
    /// Fails with `SubmissionConfiguration` before any submission happens
    /// when the config lacks a `submit_command`.
    pub fn from_config(config: &RunConfig, worker_command: String) -> Result<Self, DriverError> {
        let submit_template = config
            .submit_command
            .clone()
            .ok_or(DriverError::SubmissionConfiguration)?;
        Ok(Self {
            submit_template,
            worker_command,
        })
    }

    fn command_line(&self, ordinal: usize) -> String {
        let worker = self
            .worker_command
            .replace(ORDINAL_PLACEHOLDER, &ordinal.to_string());
        self.submit_template.replacen(COMMAND_PLACEHOLDER, &worker, 1)
    }
}

impl JobSubmitter for CommandSubmitter {
    fn submit(&self, ordinal: usize) -> Result<(), DriverError> {
        let line = self.command_line(ordinal);
        info!(ordinal, command = %line, "submitting job");
        let status = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .stdout(Stdio::null())
            .status()
            .map_err(|source| DriverError::io("sh", source))?;
        // The scheduler's exit status is advisory; a failed submission
        // surfaces later as a never-appearing sentinel.
        if !status.success() {
            warn!(ordinal, command = %line, ?status, "submission command exited non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_scheduler_command_from_both_placeholders() {
        let config = RunConfig {
            submit_command: Some("sbatch --wrap '{}'".to_string()),
            ..RunConfig::default()
        };
        let submitter = CommandSubmitter::from_config(
            &config,
            "scan generate --id {id} -c scan.toml vbf.sin".to_string(),
        )
        .expect("submitter should build");

        assert_eq!(
            submitter.command_line(4),
            "sbatch --wrap 'scan generate --id 4 -c scan.toml vbf.sin'"
        );
    }

    #[test]
    fn missing_submit_command_is_a_configuration_error() {
        let error = CommandSubmitter::from_config(&RunConfig::default(), String::new())
            .expect_err("submitter should fail");
        assert!(matches!(error, DriverError::SubmissionConfiguration));
    }
}
