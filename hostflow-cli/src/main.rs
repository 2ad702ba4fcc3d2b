//! Hostflow CLI - release pipeline controller
//!
//! Runs the stage sequence against a batch-mode host and exits 0 only if
//! every executed stage succeeded.

use anyhow::{Context, Result};
use clap::Parser;
use hostflow::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostflow")]
#[command(about = "Create, configure, build, verify and distribute a host project")]
#[command(version)]
struct Cli {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project name
    #[arg(long)]
    project_name: Option<String>,

    /// Directory that contains the project
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Path to the host executable
    #[arg(long, env = "HOSTFLOW_HOST")]
    host_path: Option<PathBuf>,

    /// Host version used when creating the project
    #[arg(long)]
    host_version: Option<String>,

    /// Automation entry point source deployed into the project
    #[arg(long)]
    automation_source: Option<PathBuf>,

    /// Class hosting the automation entry points
    #[arg(long)]
    automation_class: Option<String>,

    /// Root build version file
    #[arg(long)]
    version_file: Option<PathBuf>,

    /// Seconds to wait after deploying entry points
    #[arg(long)]
    settle_delay_secs: Option<u64>,

    /// Build every configured target
    #[arg(long)]
    run_build: bool,

    /// Bump the patch version after a successful build
    #[arg(long)]
    increment_version: bool,

    /// Verify built artifacts
    #[arg(long)]
    run_smoke_tests: bool,

    /// Distribute verified artifacts
    #[arg(long)]
    distribute_builds: bool,

    /// Skip texture import optimization
    #[arg(long)]
    skip_texture_optimization: bool,

    /// Skip mesh import optimization
    #[arg(long)]
    skip_mesh_optimization: bool,

    /// Skip audio import optimization
    #[arg(long)]
    skip_audio_optimization: bool,

    /// Skip batching setup
    #[arg(long)]
    skip_batching: bool,

    /// Skip light baking configuration
    #[arg(long)]
    skip_light_baking: bool,

    /// Skip physics layer culling
    #[arg(long)]
    skip_physics_layer_culling: bool,

    /// Skip build settings hardening
    #[arg(long)]
    skip_build_settings_hardening: bool,

    /// Write the run report to <project>/Logs/pipeline_run.json
    #[arg(long)]
    report: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(PipelineConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => PipelineConfig::new(),
        };

        if let Some(name) = self.project_name {
            config.project_name = name;
        }
        if let Some(root) = self.project_root {
            config.project_root = root;
        }
        if let Some(host) = self.host_path {
            config.host_executable = host;
        }
        if let Some(version) = self.host_version {
            config.host_version = version;
        }
        if let Some(source) = self.automation_source {
            config.automation_source = source;
        }
        if let Some(class) = self.automation_class {
            config.automation_class = class;
        }
        if let Some(file) = self.version_file {
            config.version_file = file;
        }
        if let Some(secs) = self.settle_delay_secs {
            config.settle_delay = Duration::from_secs(secs);
        }

        config.flags.run_build |= self.run_build;
        config.flags.increment_version |= self.increment_version;
        config.flags.run_smoke_tests |= self.run_smoke_tests;
        config.flags.distribute_builds |= self.distribute_builds;

        let opts = &mut config.optimizations;
        opts.skip_texture_optimization |= self.skip_texture_optimization;
        opts.skip_mesh_optimization |= self.skip_mesh_optimization;
        opts.skip_audio_optimization |= self.skip_audio_optimization;
        opts.skip_batching |= self.skip_batching;
        opts.skip_light_baking |= self.skip_light_baking;
        opts.skip_physics_layer_culling |= self.skip_physics_layer_culling;
        opts.skip_build_settings_hardening |= self.skip_build_settings_hardening;

        // Environment wins over the file for distribution, when set.
        let from_env = DistributionConfig::from_env();
        if from_env.mode != DistributionMode::None || config.distribution.mode == DistributionMode::None {
            config.distribution = from_env;
        }

        config.validate().context("invalid configuration")?;
        Ok((config, self.report))
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: PipelineConfig, write_report: bool) -> Result<i32> {
    let invoker = Arc::new(ProcessHostInvoker::new(&config.host_executable));
    let report_path = config.log_dir().join("pipeline_run.json");
    let sequencer = StageSequencer::new(config, invoker).with_event_sink(Arc::new(LoggingEventSink::debug()));

    let run = sequencer.run().await;

    println!("Pipeline run {} ({})", run.run_id, run.project);
    for line in run.summary_lines() {
        println!("  {line}");
    }
    if let Some(stage) = run.halted_at {
        println!("Halted: stage '{stage}' failed");
    }
    println!("Build version: {}", run.final_version);

    if write_report {
        run.write_report(&report_path)
            .with_context(|| format!("writing report to {}", report_path.display()))?;
        info!(path = %report_path.display(), "Run report written");
    }
    Ok(run.exit_code())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = cli.into_config().and_then(|(config, report)| {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;
        runtime.block_on(run(config, report))
    });

    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Controller error");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
