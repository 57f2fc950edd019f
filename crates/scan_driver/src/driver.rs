//! Execution driver: per-point cache check, render, run, archive, index.
//!
//! Local mode is a single sequential loop over the expanded points; the
//! only suspension points are blocking on the external runner and, in
//! cluster mode, the monitor's polling sleep. The driver itself spawns no
//! threads; any parallelism belongs to the external job scheduler.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

use scan_core::{fingerprint, ParameterPoint, ProcessDescriptor};

use crate::cache::{extract_archive, ArtifactStore, IndexRecord};
use crate::error::DriverError;
use crate::layout::{template_stem, Layout};
use crate::manifest::{expected_counts, Manifest};
use crate::monitor::CompletionMonitor;
use crate::render::{RenderContext, Renderer};
use crate::runner::ExternalRunner;
use crate::stats::collect_cross_sections;
use crate::submit::JobSubmitter;

pub const INTEGRATION_LOG: &str = "integration.log";
pub const EVENT_GENERATION_LOG: &str = "event_generation.log";
pub const LIBRARY_GENERATION_LOG: &str = "library_generation.log";
const CONTROL_FILE: &str = "input.sin";
const MODULE_LIBRARY_FILE: &str = "libgolem_olp.so";

pub struct ExecutionDriver<'a> {
    layout: &'a Layout,
    renderer: &'a dyn Renderer,
    runner: &'a dyn ExternalRunner,
    force: bool,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(layout: &'a Layout, renderer: &'a dyn Renderer, runner: &'a dyn ExternalRunner) -> Self {
        Self {
            layout,
            renderer,
            runner,
            force: false,
        }
    }

    /// Recompute cached artifacts even on a cache hit.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn fresh_seed() -> u64 {
        rand::thread_rng().gen_range(0..10_000_000)
    }

    fn descriptor_for(&self, template: &str, rendered: &str) -> Result<ProcessDescriptor, DriverError> {
        scan_core::parse_descriptor(rendered).map_err(|source| DriverError::Descriptor {
            template: template.to_string(),
            source,
        })
    }

    fn render_template(
        &self,
        template: &str,
        context: &RenderContext,
    ) -> Result<String, DriverError> {
        let path = self.layout.template_path(template);
        let text = fs::read_to_string(&path).map_err(|source| DriverError::io(&path, source))?;
        Ok(self.renderer.render(&text, context))
    }

    /// Scratch working directory with the rendered control file and, when
    /// one exists, the template's process-library archive unpacked into it.
    fn prepare_workdir(
        &self,
        template_name: &str,
        rendered: &str,
    ) -> Result<(TempDir, PathBuf), DriverError> {
        let workdir = TempDir::new()
            .map_err(|source| DriverError::io(std::env::temp_dir(), source))?;
        let control_file = workdir.path().join(CONTROL_FILE);
        fs::write(&control_file, rendered)
            .map_err(|source| DriverError::io(&control_file, source))?;
        let library = self.layout.library_archive(template_name);
        if library.is_file() {
            extract_archive(&library, workdir.path())?;
        }
        Ok((workdir, control_file))
    }

    /// Compile the template's process library once and archive it under
    /// `Libraries/` for reuse by every later run. Skipped whenever the
    /// archive already exists; `purge --library` drops it so the next run
    /// rebuilds.
    pub fn ensure_library(&self, template: &str) -> Result<(), DriverError> {
        let template_name = template_stem(template);
        let archive = self.layout.library_archive(template_name);
        if archive.is_file() {
            return Ok(());
        }

        info!(template = template_name, "generating process library");
        // Library compilation is parameter independent: unit scale, fixed
        // seed, no event generation.
        let context = RenderContext::new(self.layout.model_dir(), &ParameterPoint::new(), 1);
        let rendered = self.render_template(template, &context)?;
        let descriptor = self.descriptor_for(template_name, &rendered)?;
        let workdir = TempDir::new()
            .map_err(|source| DriverError::io(std::env::temp_dir(), source))?;
        let control_file = workdir.path().join(CONTROL_FILE);
        fs::write(&control_file, &rendered)
            .map_err(|source| DriverError::io(&control_file, source))?;

        self.runner.run(
            &control_file,
            workdir.path(),
            &self.layout.log_path(LIBRARY_GENERATION_LOG),
        )?;

        let workspace =
            compile_workspace(&rendered).ok_or(DriverError::MissingCompileWorkspace)?;
        let staging = TempDir::new()
            .map_err(|source| DriverError::io(std::env::temp_dir(), source))?;
        copy_tree(
            &workdir.path().join(&workspace),
            &staging.path().join(&workspace),
        )?;
        copy_module_outputs(workdir.path(), &descriptor, staging.path())?;

        let libraries = ArtifactStore::open(self.layout.libraries_dir())?;
        libraries.store(template_name, staging.path())?;
        info!(template = template_name, "process library archived");
        Ok(())
    }

    /// Produce the integration-grid artifact for one point, skipping work
    /// when the fingerprint is already cached (unless forced).
    pub fn run_integration(
        &self,
        template: &str,
        point: &ParameterPoint,
    ) -> Result<String, DriverError> {
        let template_name = template_stem(template);
        let fp = fingerprint(template_name, point);
        let grids = ArtifactStore::open(self.layout.grids_dir())?;
        if grids.exists(&fp) && !self.force {
            info!(fingerprint = %fp, "grid for current configuration already exists, skipping");
            return Ok(fp);
        }

        self.ensure_library(template)?;

        info!(template = template_name, point = ?point, "running integration");
        let seed = Self::fresh_seed();
        let context = RenderContext::new(self.layout.model_dir(), point, seed);
        let rendered = self.render_template(template, &context)?;
        let descriptor = self.descriptor_for(template_name, &rendered)?;
        let (workdir, control_file) = self.prepare_workdir(template_name, &rendered)?;

        self.runner.run(
            &control_file,
            workdir.path(),
            &self.layout.log_path(INTEGRATION_LOG),
        )?;

        let workspace =
            integrate_workspace(&rendered).ok_or(DriverError::MissingIntegrateWorkspace)?;
        let grid_dir = workdir.path().join(workspace);
        grids.store(&fp, &grid_dir)?;

        let cross_sections = collect_cross_sections(&grid_dir, &descriptor);
        for (process, section) in &cross_sections {
            info!(
                process,
                value = section.value,
                error = section.error,
                "total cross section"
            );
        }
        grids.update_index(
            &fp,
            IndexRecord {
                template: template_name.to_string(),
                parameters: point.clone(),
                seed,
                cross_sections,
                n_events: BTreeMap::new(),
            },
        )?;
        info!(template = template_name, fingerprint = %fp, "integration grid stored");
        Ok(fp)
    }

    /// Integrate every point whose grid is not yet cached, in expansion
    /// order. A runner failure aborts the whole batch.
    pub fn integrate_missing(
        &self,
        template: &str,
        points: &[ParameterPoint],
    ) -> Result<(), DriverError> {
        if points.len() > 1 {
            info!(count = points.len(), "running integration for parameter combinations");
        }
        for (ordinal, point) in points.iter().enumerate() {
            info!(ordinal = ordinal + 1, total = points.len(), "integration step");
            self.run_integration(template, point)?;
        }
        Ok(())
    }

    /// Run event generation for one point and merge the output into the
    /// accumulated artifact for its fingerprint. On success, `stamp` drops
    /// the per-ordinal completion sentinel for cluster workers.
    pub fn run_event_generation(
        &self,
        template: &str,
        point: &ParameterPoint,
        stamp: Option<usize>,
    ) -> Result<String, DriverError> {
        let template_name = template_stem(template);
        let fp = fingerprint(template_name, point);
        let grids = ArtifactStore::open(self.layout.grids_dir())?;
        if !grids.exists(&fp) {
            return Err(DriverError::MissingGrid {
                fingerprint: fp.clone(),
            });
        }
        let events = ArtifactStore::open(self.layout.events_dir())?;
        self.ensure_library(template)?;

        info!(template = template_name, point = ?point, "running event generation");
        let event_seed = Self::fresh_seed();
        let context = RenderContext::new(self.layout.model_dir(), point, 1)
            .for_event_generation(event_seed);
        let rendered = self.render_template(template, &context)?;
        let descriptor = self.descriptor_for(template_name, &rendered)?;
        let (workdir, control_file) = self.prepare_workdir(template_name, &rendered)?;
        grids.unpack(&fp, workdir.path())?;

        self.runner.run(
            &control_file,
            workdir.path(),
            &self.layout.log_path(EVENT_GENERATION_LOG),
        )?;

        // Unpack any previously accumulated artifact, add this run's raw
        // output under a per-seed directory, merge the bookkeeping, repack.
        let event_files = workdir.path().join("event_files");
        fs::create_dir_all(&event_files)
            .map_err(|source| DriverError::io(&event_files, source))?;
        if events.exists(&fp) {
            events.unpack(&fp, &event_files)?;
        }
        let run_dir = event_files.join(event_seed.to_string());
        fs::create_dir_all(&run_dir).map_err(|source| DriverError::io(&run_dir, source))?;
        copy_sample_outputs(workdir.path(), &descriptor, &run_dir)?;

        let mut manifest = Manifest::load(&event_files)?
            .unwrap_or_else(|| Manifest::new(template_name, point.clone(), &descriptor));
        manifest.record_run(event_seed, expected_counts(&descriptor));
        manifest.save(&event_files)?;

        events.store(&fp, &event_files)?;
        events.update_index(
            &fp,
            IndexRecord {
                template: template_name.to_string(),
                parameters: point.clone(),
                seed: event_seed,
                cross_sections: BTreeMap::new(),
                n_events: manifest.totals().clone(),
            },
        )?;

        if let Some(ordinal) = stamp {
            let sentinel = self.layout.sentinel_path(ordinal);
            fs::write(&sentinel, "").map_err(|source| DriverError::io(&sentinel, source))?;
        }
        info!(template = template_name, fingerprint = %fp, "event sample stored");
        Ok(fp)
    }

    /// Sequential local batch: integrate missing grids first, then generate
    /// events for every point not already cached (unless forced).
    pub fn generate_local(
        &self,
        template: &str,
        points: &[ParameterPoint],
    ) -> Result<(), DriverError> {
        self.integrate_missing(template, points)?;
        let events = ArtifactStore::open(self.layout.events_dir())?;
        if points.len() > 1 {
            info!(count = points.len(), "running event generation for parameter combinations");
        }
        for (ordinal, point) in points.iter().enumerate() {
            let fp = fingerprint(template_stem(template), point);
            if events.exists(&fp) && !self.force {
                info!(ordinal, fingerprint = %fp, "event sample already cached, skipping");
                continue;
            }
            info!(ordinal = ordinal + 1, total = points.len(), "event generation step");
            self.run_event_generation(template, point, None)?;
        }
        Ok(())
    }

    /// Remote-worker entry point: resolve the point from its ordinal index,
    /// integrate its grid if missing, generate events, drop the sentinel.
    pub fn generate_indexed(
        &self,
        template: &str,
        points: &[ParameterPoint],
        index: usize,
    ) -> Result<(), DriverError> {
        let point = points.get(index).ok_or(DriverError::PointIndexOutOfRange {
            index,
            count: points.len(),
        })?;
        info!(index, "running event generation for one parameter combination");
        self.run_integration(template, point)?;
        self.run_event_generation(template, point, Some(index))?;
        Ok(())
    }

    /// Ordinal indices still requiring work: events-cache misses, or every
    /// index when forced.
    pub fn pending_indices(
        &self,
        template: &str,
        points: &[ParameterPoint],
    ) -> Result<Vec<usize>, DriverError> {
        let events = ArtifactStore::open(self.layout.events_dir())?;
        let template_name = template_stem(template);
        Ok(points
            .iter()
            .enumerate()
            .filter(|(_, point)| self.force || !events.exists(&fingerprint(template_name, point)))
            .map(|(index, _)| index)
            .collect())
    }

    /// Fan-out/fan-in cluster batch: one submission per pending index, then
    /// wait for all sentinels.
    pub fn generate_cluster(
        &self,
        template: &str,
        points: &[ParameterPoint],
        submitter: &dyn JobSubmitter,
        monitor: &CompletionMonitor,
    ) -> Result<(), DriverError> {
        let pending = self.pending_indices(template, points)?;
        if pending.is_empty() {
            info!("all parameter combinations already cached, nothing to submit");
            return Ok(());
        }
        self.layout.ensure_dir(&self.layout.events_dir())?;
        info!(jobs = pending.len(), "submitting event generation jobs");
        for &index in &pending {
            submitter.submit(index)?;
        }
        monitor.wait_for(&pending)
    }
}

/// First `$<key> = "value"` assignment of the rendered text.
fn quoted_assignment(rendered: &str, key: &str) -> Option<String> {
    for line in rendered.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix(key) {
            let value = rest.trim_start().strip_prefix('=')?.trim();
            let inner = value.strip_prefix('"')?;
            let close = inner.find('"')?;
            return Some(inner[..close].to_string());
        }
    }
    None
}

/// Names the grid output directory to archive after integration.
pub fn integrate_workspace(rendered: &str) -> Option<String> {
    quoted_assignment(rendered, "$integrate_workspace")
}

/// Names the compiled process-library directory to archive.
pub fn compile_workspace(rendered: &str) -> Option<String> {
    quoted_assignment(rendered, "$compile_workspace")
}

/// Recursive directory copy preserving relative paths.
fn copy_tree(source: &Path, dest: &Path) -> Result<(), DriverError> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|err| {
            DriverError::io(source, std::io::Error::new(std::io::ErrorKind::Other, err))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walked path is under its own root");
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|source| DriverError::io(&target, source))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|source| DriverError::io(&target, source))?;
        }
    }
    Ok(())
}

/// Copy each component's compiled matrix-element outputs into the library
/// staging directory: the per-process module library under
/// `<internal_name>_olp_modules/build/` plus top-level `.ol*` files.
fn copy_module_outputs(
    workdir: &Path,
    descriptor: &ProcessDescriptor,
    staging: &Path,
) -> Result<(), DriverError> {
    for component in descriptor.values().flat_map(|components| components.values()) {
        let relative = PathBuf::from(format!("{}_olp_modules", component.internal_name))
            .join("build")
            .join(MODULE_LIBRARY_FILE);
        let module = workdir.join(&relative);
        if !module.is_file() {
            continue;
        }
        let target = staging.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| DriverError::io(parent, source))?;
        }
        fs::copy(&module, &target).map_err(|source| DriverError::io(&target, source))?;
    }

    let entries = fs::read_dir(workdir).map_err(|source| DriverError::io(workdir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| DriverError::io(workdir, source))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let is_module_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.starts_with("ol"));
        if is_module_file {
            let target = staging.join(entry.file_name());
            fs::copy(&path, &target).map_err(|source| DriverError::io(&target, source))?;
        }
    }
    Ok(())
}

/// Copy each component's sample output files (any file whose name starts
/// with the sample identifier) into the per-seed run directory.
fn copy_sample_outputs(
    workdir: &Path,
    descriptor: &ProcessDescriptor,
    run_dir: &Path,
) -> Result<(), DriverError> {
    let samples: Vec<&str> = descriptor
        .values()
        .flat_map(|components| components.values())
        .filter_map(|info| info.sample.as_deref())
        .collect();
    if samples.is_empty() {
        return Ok(());
    }
    let entries = fs::read_dir(workdir).map_err(|source| DriverError::io(workdir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| DriverError::io(workdir, source))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if samples.iter().any(|sample| name.starts_with(sample)) {
            let dest = run_dir.join(name.as_ref());
            fs::copy(entry.path(), &dest).map_err(|source| DriverError::io(&dest, source))?;
        }
    }
    Ok(())
}
