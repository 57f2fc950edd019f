//! Deterministic parameter-scan domain primitives.
//!
//! This crate owns the pure, order-stable parts of the scan pipeline:
//! parameter-space expansion, content fingerprinting, and the control-text
//! process descriptor parser. It intentionally excludes filesystem, process
//! and scheduler concerns, which live in `scan_driver`.

pub mod descriptor;
pub mod fingerprint;
pub mod params;

pub use descriptor::{parse_descriptor, Component, ComponentInfo, DescriptorError, ProcessDescriptor};
pub use fingerprint::fingerprint;
pub use params::{expand, parse_override, AxisSpec, ParameterPoint, ParameterSpace, ParseError, SCALE_AXIS};
