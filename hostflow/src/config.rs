//! Pipeline configuration.
//!
//! Static configuration (paths, timeouts, targets) plus the runtime flags
//! that enable optional stages. Distribution settings come from the
//! environment.

use crate::errors::{HostflowError, Result};
use crate::version::BuildVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable selecting the distribution mode.
pub const DISTRIBUTION_MODE_VAR: &str = "HOSTFLOW_DISTRIBUTION_MODE";
/// Environment variable holding the distribution base path.
pub const DISTRIBUTION_PATH_VAR: &str = "HOSTFLOW_DISTRIBUTION_PATH";
/// Environment variable holding an optional distribution subfolder.
pub const DISTRIBUTION_SUBFOLDER_VAR: &str = "HOSTFLOW_DISTRIBUTION_SUBFOLDER";

/// Switches enabling the optional stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFlags {
    /// Build every configured target.
    #[serde(default)]
    pub run_build: bool,
    /// Bump the persisted version after a successful build.
    #[serde(default)]
    pub increment_version: bool,
    /// Verify built artifacts.
    #[serde(default)]
    pub run_smoke_tests: bool,
    /// Copy verified artifacts to the distribution sink.
    #[serde(default)]
    pub distribute_builds: bool,
}

/// Host-side optimization passes that can be skipped.
///
/// Each switch is passed to the configure-and-setup entry point as a
/// `-<name> true|false` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationSwitches {
    /// Skip texture import optimization.
    #[serde(default)]
    pub skip_texture_optimization: bool,
    /// Skip mesh import optimization.
    #[serde(default)]
    pub skip_mesh_optimization: bool,
    /// Skip audio import optimization.
    #[serde(default)]
    pub skip_audio_optimization: bool,
    /// Skip static/dynamic batching setup.
    #[serde(default)]
    pub skip_batching: bool,
    /// Skip light baking configuration.
    #[serde(default)]
    pub skip_light_baking: bool,
    /// Skip the physics layer collision matrix.
    #[serde(default)]
    pub skip_physics_layer_culling: bool,
    /// Skip stripping/compatibility build settings.
    #[serde(default)]
    pub skip_build_settings_hardening: bool,
}

impl OptimizationSwitches {
    /// Renders the switches as host arguments.
    #[must_use]
    pub fn to_host_args(&self) -> Vec<String> {
        [
            ("skipTextureOptimization", self.skip_texture_optimization),
            ("skipMeshOptimization", self.skip_mesh_optimization),
            ("skipAudioOptimization", self.skip_audio_optimization),
            ("skipBatching", self.skip_batching),
            ("skipLightBaking", self.skip_light_baking),
            ("skipPhysicsLayerCulling", self.skip_physics_layer_culling),
            ("skipBuildSettingsHardening", self.skip_build_settings_hardening),
        ]
        .into_iter()
        .flat_map(|(name, value)| [format!("-{name}"), value.to_string()])
        .collect()
    }
}

/// One platform the build stage produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Display name, also the output subdirectory.
    pub name: String,
    /// Identifier passed to the host's `-buildTarget`.
    pub host_target: String,
    /// Artifact file name; `{project}` is replaced by the project name.
    pub artifact: String,
    /// Companion data directory name, same substitution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Launch the artifact during smoke tests.
    #[serde(default)]
    pub launch_probe: bool,
}

impl BuildTarget {
    /// Desktop target with a data directory, launch-probed.
    #[must_use]
    pub fn standalone_windows() -> Self {
        Self {
            name: "StandaloneWindows64".to_string(),
            host_target: "StandaloneWindows64".to_string(),
            artifact: "{project}.exe".to_string(),
            data_dir: Some("{project}_Data".to_string()),
            launch_probe: true,
        }
    }

    /// Mobile target, single-file package.
    #[must_use]
    pub fn android() -> Self {
        Self {
            name: "Android".to_string(),
            host_target: "Android".to_string(),
            artifact: "{project}.apk".to_string(),
            data_dir: None,
            launch_probe: false,
        }
    }

    /// Artifact file name for `project`.
    #[must_use]
    pub fn artifact_name(&self, project: &str) -> String {
        self.artifact.replace("{project}", project)
    }

    /// Data directory name for `project`.
    #[must_use]
    pub fn data_dir_name(&self, project: &str) -> Option<String> {
        self.data_dir.as_ref().map(|d| d.replace("{project}", project))
    }
}

/// Per-stage host invocation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Project creation.
    #[serde(default = "default_create_timeout")]
    pub create_project: Duration,
    /// Dependency install, configuration and scene setup.
    #[serde(default = "default_configure_timeout")]
    pub configure: Duration,
    /// One build target.
    #[serde(default = "default_build_timeout")]
    pub build: Duration,
    /// Applying the bumped version.
    #[serde(default = "default_increment_timeout")]
    pub increment_version: Duration,
}

fn default_create_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_configure_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_increment_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            create_project: default_create_timeout(),
            configure: default_configure_timeout(),
            build: default_build_timeout(),
            increment_version: default_increment_timeout(),
        }
    }
}

/// How verified artifacts are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Do nothing.
    #[default]
    None,
    /// Copy to a local or shared filesystem path.
    LocalCopy,
    /// Upload to a cloud drive (not implemented, logs and does nothing).
    CloudDrive,
    /// Upload to an object store (not implemented, logs and does nothing).
    ObjectStore,
}

impl DistributionMode {
    /// Parses a mode name; unknown names map to [`DistributionMode::None`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local_copy" | "local" | "copy" => Self::LocalCopy,
            "cloud_drive" | "gdrive" => Self::CloudDrive,
            "object_store" | "s3" => Self::ObjectStore,
            "" | "none" | "noop" => Self::None,
            other => {
                tracing::warn!(mode = other, "Unknown distribution mode, distribution disabled");
                Self::None
            }
        }
    }
}

/// Where and how to distribute artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Selected mode.
    #[serde(default)]
    pub mode: DistributionMode,
    /// Base destination path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    /// Optional subfolder under the base path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
}

impl DistributionConfig {
    /// Reads the distribution settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the distribution settings through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            mode: lookup(DISTRIBUTION_MODE_VAR)
                .map(|m| DistributionMode::parse_lenient(&m))
                .unwrap_or_default(),
            destination: non_empty(DISTRIBUTION_PATH_VAR).map(PathBuf::from),
            subfolder: non_empty(DISTRIBUTION_SUBFOLDER_VAR),
        }
    }

    /// Final destination directory: base path plus optional subfolder.
    pub fn destination_dir(&self) -> Result<PathBuf> {
        let base = self.destination.as_ref().ok_or_else(|| {
            HostflowError::Config(format!("{DISTRIBUTION_PATH_VAR} must be set for {:?}", self.mode))
        })?;
        Ok(match &self.subfolder {
            Some(sub) => base.join(sub),
            None => base.clone(),
        })
    }
}

/// Complete configuration for one controller run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project name, used for artifact names.
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// Directory containing the project (the project lives at `<root>/<name>`).
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Host executable.
    #[serde(default = "default_host_executable")]
    pub host_executable: PathBuf,
    /// Host version requested at project creation.
    #[serde(default = "default_host_version")]
    pub host_version: String,
    /// Source of the automation entry points deployed into the project.
    #[serde(default = "default_automation_source")]
    pub automation_source: PathBuf,
    /// Class that hosts the automation entry points.
    #[serde(default = "default_automation_class")]
    pub automation_class: String,
    /// Root copy of the build version.
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
    /// Project-relative copy of the build version read by the host.
    #[serde(default = "default_project_version_file")]
    pub project_version_file: PathBuf,
    /// Wait after deploying entry points so the host picks them up.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: Duration,
    /// Grace period for the smoke-test launch probe.
    #[serde(default = "default_probe_grace")]
    pub probe_grace: Duration,
    /// Host invocation timeouts.
    #[serde(default)]
    pub timeouts: StageTimeouts,
    /// Build targets, in build order.
    #[serde(default = "default_targets")]
    pub targets: Vec<BuildTarget>,
    /// Optional stage switches.
    #[serde(default)]
    pub flags: PipelineFlags,
    /// Optimization skip switches.
    #[serde(default)]
    pub optimizations: OptimizationSwitches,
    /// Distribution settings.
    #[serde(default)]
    pub distribution: DistributionConfig,
}

fn default_project_name() -> String {
    "RubeGoldbergVR".to_string()
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_host_executable() -> PathBuf {
    PathBuf::from("Unity")
}

fn default_host_version() -> String {
    "2023.2.14f1".to_string()
}

fn default_automation_source() -> PathBuf {
    PathBuf::from("BuildAutomation.cs")
}

fn default_automation_class() -> String {
    "BuildAutomation".to_string()
}

fn default_version_file() -> PathBuf {
    PathBuf::from("build_version.txt")
}

fn default_project_version_file() -> PathBuf {
    PathBuf::from("Assets/Resources/build_version.txt")
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_targets() -> Vec<BuildTarget> {
    vec![BuildTarget::standalone_windows(), BuildTarget::android()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            project_root: default_project_root(),
            host_executable: default_host_executable(),
            host_version: default_host_version(),
            automation_source: default_automation_source(),
            automation_class: default_automation_class(),
            version_file: default_version_file(),
            project_version_file: default_project_version_file(),
            settle_delay: default_settle_delay(),
            probe_grace: default_probe_grace(),
            timeouts: StageTimeouts::default(),
            targets: default_targets(),
            flags: PipelineFlags::default(),
            optimizations: OptimizationSwitches::default(),
            distribution: DistributionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file; missing keys take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the project name.
    #[must_use]
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    /// Sets the project root directory.
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Sets the stage flags.
    #[must_use]
    pub fn with_flags(mut self, flags: PipelineFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the build targets.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<BuildTarget>) -> Self {
        self.targets = targets;
        self
    }

    /// Sets the distribution settings.
    #[must_use]
    pub fn with_distribution(mut self, distribution: DistributionConfig) -> Self {
        self.distribution = distribution;
        self
    }

    /// Sets the settle delay after deployment.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the root version file.
    #[must_use]
    pub fn with_version_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_file = path.into();
        self
    }

    /// Sets the automation source file.
    #[must_use]
    pub fn with_automation_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.automation_source = path.into();
        self
    }

    /// Sets the host executable.
    #[must_use]
    pub fn with_host_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_executable = path.into();
        self
    }

    /// Checks invariants the sequencer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(HostflowError::Config("project name must not be empty".to_string()));
        }
        if self.automation_class.trim().is_empty() {
            return Err(HostflowError::Config("automation class must not be empty".to_string()));
        }
        if self.flags.run_build && self.targets.is_empty() {
            return Err(HostflowError::Config(
                "run-build requires at least one build target".to_string(),
            ));
        }
        let mut names = std::collections::HashSet::new();
        for target in &self.targets {
            if !names.insert(target.name.as_str()) {
                return Err(HostflowError::Config(format!(
                    "duplicate build target '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Directory of the project.
    #[must_use]
    pub fn project_path(&self) -> PathBuf {
        self.project_root.join(&self.project_name)
    }

    /// Directory holding per-stage logs.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.project_path().join("Logs")
    }

    /// Project-side copy of the build version.
    #[must_use]
    pub fn project_version_path(&self) -> PathBuf {
        self.project_path().join(&self.project_version_file)
    }

    /// Version-qualified build output directory: `<project>/Builds/v<version>`.
    #[must_use]
    pub fn build_dir(&self, version: &BuildVersion) -> PathBuf {
        self.project_path().join("Builds").join(format!("v{version}"))
    }

    /// Fully qualified host entry point for `method`.
    #[must_use]
    pub fn entry_point(&self, method: &str) -> String {
        format!("{}.{method}", self.automation_class)
    }
}
