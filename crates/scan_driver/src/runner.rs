//! External-runner boundary.
//!
//! The simulation engine is an opaque external program; its only observable
//! contract is the exit status and the output it leaves in the working
//! directory. All of its output is teed into a log file so a failure can
//! point the operator at the captured text.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::DriverError;
use crate::install::InstallInfo;

pub trait ExternalRunner {
    /// Execute one rendered control file in `workdir`, blocking until the
    /// process exits. Output is captured in `log_path`.
    fn run(&self, control_file: &Path, workdir: &Path, log_path: &Path) -> Result<(), DriverError>;
}

/// Runs the installed engine binary as a child process.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    binary: PathBuf,
    prefix: PathBuf,
}

impl CommandRunner {
    pub const BINARY_NAME: &'static str = "whizard";

    pub fn from_install(install: &InstallInfo) -> Self {
        Self {
            binary: install.binary(Self::BINARY_NAME),
            prefix: install.prefix.clone(),
        }
    }

    fn library_path(&self) -> String {
        let mut paths = vec![self.prefix.join("lib"), self.prefix.join("lib64")];
        if let Some(existing) = std::env::var_os("LD_LIBRARY_PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths)
            .map(|joined| joined.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ExternalRunner for CommandRunner {
    fn run(&self, control_file: &Path, workdir: &Path, log_path: &Path) -> Result<(), DriverError> {
        let log = File::create(log_path).map_err(|source| DriverError::io(log_path, source))?;
        let log_err = log
            .try_clone()
            .map_err(|source| DriverError::io(log_path, source))?;

        let status = Command::new(&self.binary)
            .arg(control_file)
            .current_dir(workdir)
            .env("LD_LIBRARY_PATH", self.library_path())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()
            .map_err(|source| DriverError::io(&self.binary, source))?;

        if !status.success() {
            return Err(DriverError::RunnerFailure {
                status: status.code().unwrap_or(-1),
                log: log_path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonzero_exit_surfaces_the_log_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("run.log");
        let runner = CommandRunner {
            binary: PathBuf::from("/bin/false"),
            prefix: dir.path().to_path_buf(),
        };

        let error = runner
            .run(&dir.path().join("input.sin"), dir.path(), &log)
            .expect_err("run should fail");
        match error {
            DriverError::RunnerFailure { status, log: path } => {
                assert_ne!(status, 0);
                assert_eq!(path, log);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn successful_run_captures_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("run.log");
        let runner = CommandRunner {
            binary: PathBuf::from("/bin/true"),
            prefix: dir.path().to_path_buf(),
        };

        runner
            .run(&dir.path().join("input.sin"), dir.path(), &log)
            .expect("run should pass");
        assert!(log.is_file());
    }
}
