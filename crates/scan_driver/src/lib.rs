//! Filesystem, process and scheduler side of the parameter scan.
//!
//! Builds on the deterministic primitives in `scan_core`: loads the run
//! configuration, keeps the content-addressed artifact caches, drives the
//! external runner per parameter point (sequentially or via cluster
//! fan-out), and waits on per-ordinal completion sentinels.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod install;
pub mod layout;
pub mod manifest;
pub mod monitor;
pub mod purge;
pub mod render;
pub mod runner;
pub mod stats;
pub mod submit;

pub use cache::{ArtifactStore, CrossSection, EventTotals, IndexRecord};
pub use config::RunConfig;
pub use driver::ExecutionDriver;
pub use error::DriverError;
pub use install::InstallInfo;
pub use layout::Layout;
pub use monitor::CompletionMonitor;
pub use render::{RenderContext, Renderer, SubstitutionRenderer};
pub use runner::{CommandRunner, ExternalRunner};
pub use submit::{CommandSubmitter, JobSubmitter};
