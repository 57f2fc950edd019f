//! Fan-in completion monitor for cluster dispatch.
//!
//! Remote workers signal success by dropping a per-ordinal sentinel file;
//! the monitor polls at a fixed interval, consumes each sentinel exactly
//! once, and returns only when every expected sentinel has been observed.
//! There is deliberately no timeout: a silently failed remote job stalls
//! the wait until the operator intervenes (documented limitation).

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::DriverError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct CompletionMonitor {
    sentinel_dir: PathBuf,
    poll_interval: Duration,
    show_progress: bool,
}

impl CompletionMonitor {
    pub fn new(sentinel_dir: impl Into<PathBuf>) -> Self {
        Self {
            sentinel_dir: sentinel_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            show_progress: true,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn sentinel_path(&self, index: usize) -> PathBuf {
        self.sentinel_dir.join(format!("{index}.stamp"))
    }

    /// Block until every expected per-ordinal sentinel has appeared,
    /// consuming each one as it is observed.
    pub fn wait_for(&self, expected: &[usize]) -> Result<(), DriverError> {
        if expected.is_empty() {
            return Ok(());
        }
        info!(jobs = expected.len(), "waiting for submitted jobs to complete");
        let bar = if self.show_progress {
            let bar = ProgressBar::new(expected.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .expect("progress template should be valid")
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut finished = vec![false; expected.len()];
        loop {
            for (done, &index) in finished.iter_mut().zip(expected) {
                if *done {
                    continue;
                }
                let sentinel = self.sentinel_path(index);
                if sentinel.exists() {
                    fs::remove_file(&sentinel)
                        .map_err(|source| DriverError::io(&sentinel, source))?;
                    *done = true;
                    bar.inc(1);
                }
            }
            if finished.iter().all(|&done| done) {
                break;
            }
            thread::sleep(self.poll_interval);
        }
        bar.finish_and_clear();
        info!(jobs = expected.len(), "all submitted jobs completed");
        Ok(())
    }

    pub fn sentinel_dir(&self) -> &Path {
        &self.sentinel_dir
    }
}
