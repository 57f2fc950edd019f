//! Command-line frontend for the parameter-scan orchestrator.

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use scan_core::expand;
use scan_driver::{
    purge::purge, CommandRunner, CommandSubmitter, CompletionMonitor, DriverError, ExecutionDriver,
    InstallInfo, Layout, RunConfig, SubstitutionRenderer,
};

#[derive(Parser)]
#[command(
    name = "scan",
    about = "Parameter-space scans for an external event generator",
    long_about = "Expands a declared parameter space into concrete points, caches\n\
                  integration grids and event samples by content fingerprint, and\n\
                  drives the external generator locally or via cluster fan-out."
)]
struct Cli {
    /// Scan root directory holding Templates/, Grids/, Events/ and the
    /// installation record
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,
    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce integration grids for every expanded parameter point
    Integrate {
        /// Run-configuration document (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Parameter override, repeatable: name=value, name=[v1,v2,...],
        /// or name=start:stop:step
        #[arg(short = 'P', value_name = "NAME=VALUE")]
        parameter: Vec<String>,
        /// Recompute grids even when the fingerprint is already cached
        #[arg(long)]
        force: bool,
        /// Template file name in the Templates directory
        template: String,
    },
    /// Generate event samples, integrating missing grids first
    Generate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short = 'P', value_name = "NAME=VALUE")]
        parameter: Vec<String>,
        /// Submit one job per pending point instead of running locally
        #[arg(long)]
        cluster: bool,
        /// Run only the given ordinal parameter point (remote-worker mode)
        #[arg(long)]
        id: Option<usize>,
        /// Regenerate samples even when the fingerprint is already cached
        #[arg(long)]
        force: bool,
        template: String,
    },
    /// Delete cached grids (and optionally the process library) for a template
    Purge {
        /// Also remove the template's process-library archive
        #[arg(long)]
        library: bool,
        template: String,
    },
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    if let Err(err) = run(cli) {
        error!("{err}");
        exit(1);
    }
}

fn run(cli: Cli) -> Result<(), DriverError> {
    let layout = Layout::new(&cli.root);
    match cli.command {
        Commands::Integrate {
            config,
            parameter,
            force,
            template,
        } => {
            let config = RunConfig::load_optional(config.as_deref())?;
            let jobs = expand(&config.parameter_space(), &parameter)?;
            let install = InstallInfo::load(&layout.install_info_path())?;
            let runner = CommandRunner::from_install(&install);
            let renderer = SubstitutionRenderer;
            ExecutionDriver::new(&layout, &renderer, &runner)
                .force(force)
                .integrate_missing(&template, &jobs)
        }
        Commands::Generate {
            config,
            parameter,
            cluster,
            id,
            force,
            template,
        } => {
            let config_path = config;
            let config = RunConfig::load_optional(config_path.as_deref())?;
            let jobs = expand(&config.parameter_space(), &parameter)?;
            let install = InstallInfo::load(&layout.install_info_path())?;
            let runner = CommandRunner::from_install(&install);
            let renderer = SubstitutionRenderer;
            let driver = ExecutionDriver::new(&layout, &renderer, &runner).force(force);

            if cluster {
                let worker =
                    worker_command(&cli.root, config_path.as_deref(), &parameter, &template, force);
                let submitter = CommandSubmitter::from_config(&config, worker)?;
                let monitor = CompletionMonitor::new(layout.events_dir());
                driver.generate_cluster(&template, &jobs, &submitter, &monitor)
            } else if let Some(index) = id {
                driver.generate_indexed(&template, &jobs, index)
            } else {
                driver.generate_local(&template, &jobs)
            }
        }
        Commands::Purge { library, template } => purge(&layout, &template, library),
    }
}

/// Worker invocation submitted to the cluster; `{id}` is replaced with the
/// ordinal index per submission, so each remote worker can resolve its own
/// parameter point from the deterministic expansion order.
fn worker_command(
    root: &std::path::Path,
    config: Option<&std::path::Path>,
    parameters: &[String],
    template: &str,
    force: bool,
) -> String {
    let program = std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "scan".to_string());
    let mut command = format!("{program} --root {} generate --id {{id}}", root.display());
    if let Some(config) = config {
        command.push_str(&format!(" -c {}", config.display()));
    }
    for parameter in parameters {
        command.push_str(&format!(" -P{parameter}"));
    }
    if force {
        command.push_str(" --force");
    }
    command.push(' ');
    command.push_str(template);
    command
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::worker_command;

    #[test]
    fn worker_invocation_carries_config_overrides_and_force() {
        let command = worker_command(
            Path::new("/scan"),
            Some(Path::new("scan.toml")),
            &["c_hhh=1.0".to_string()],
            "vbf.sin",
            true,
        );
        assert!(command
            .ends_with("--root /scan generate --id {id} -c scan.toml -Pc_hhh=1.0 --force vbf.sin"));
    }

    #[test]
    fn worker_invocation_omits_absent_options() {
        let command = worker_command(Path::new("/scan"), None, &[], "vbf.sin", false);
        assert!(command.ends_with("--root /scan generate --id {id} vbf.sin"));
    }
}
