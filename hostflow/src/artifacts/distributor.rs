//! Copies verified artifacts to the configured distribution sink.

use crate::config::{BuildTarget, DistributionConfig, DistributionMode};
use crate::errors::{HostflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What a distribution run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    /// Mode that was applied.
    pub mode: DistributionMode,
    /// Destination directory, for copying modes.
    pub destination: Option<PathBuf>,
    /// Files written at the destination.
    pub copied: Vec<PathBuf>,
    /// Source artifacts that did not exist.
    pub missing: Vec<PathBuf>,
    /// Copy errors, one per failed artifact.
    pub errors: Vec<String>,
}

impl DistributionReport {
    /// Returns true if every artifact was distributed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty()
    }
}

/// Distributes a version's build directory according to a [`DistributionConfig`].
#[derive(Debug, Clone)]
pub struct Distributor {
    config: DistributionConfig,
}

impl Distributor {
    /// Creates a distributor.
    #[must_use]
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    /// Distributes the artifacts of `targets` found under `build_dir/<target>`.
    ///
    /// Each target lands in `<destination>/<target>/`. A missing artifact is
    /// recorded and the remaining artifacts are still copied.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a copying mode has no destination.
    pub fn distribute(&self, build_dir: &Path, project: &str, targets: &[BuildTarget]) -> Result<DistributionReport> {
        let mut report = DistributionReport {
            mode: self.config.mode,
            ..Default::default()
        };

        match self.config.mode {
            DistributionMode::None => {
                info!("Distribution disabled, nothing copied");
                return Ok(report);
            }
            DistributionMode::CloudDrive | DistributionMode::ObjectStore => {
                warn!(mode = ?self.config.mode, "Distribution mode not implemented, nothing copied");
                return Ok(report);
            }
            DistributionMode::LocalCopy => {}
        }

        let destination = self.config.destination_dir()?;
        info!(destination = %destination.display(), "Copying artifacts");
        report.destination = Some(destination.clone());

        for target in targets {
            let source_dir = build_dir.join(&target.name);
            let dest_dir = destination.join(&target.name);

            let mut sources = vec![source_dir.join(target.artifact_name(project))];
            if let Some(data) = target.data_dir_name(project) {
                sources.push(source_dir.join(data));
            }

            for source in sources {
                if !source.exists() {
                    warn!(target = %target.name, path = %source.display(), "Artifact to distribute is missing");
                    report.missing.push(source);
                    continue;
                }
                let Some(name) = source.file_name() else {
                    continue;
                };
                let dest = dest_dir.join(name);
                let copied = if source.is_dir() {
                    copy_dir(&source, &dest)
                } else {
                    copy_file(&source, &dest).map(|()| vec![dest.clone()])
                };
                match copied {
                    Ok(files) => {
                        debug!(target = %target.name, files = files.len(), dest = %dest.display(), "Copied");
                        report.copied.extend(files);
                    }
                    Err(e) => {
                        warn!(target = %target.name, path = %source.display(), error = %e, "Copy failed");
                        report.errors.push(format!("{}: {e}", source.display()));
                    }
                }
            }
        }

        info!(
            copied = report.copied.len(),
            missing = report.missing.len(),
            errors = report.errors.len(),
            "Distribution finished"
        );
        Ok(report)
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, dest)?;
    Ok(())
}

/// Recursively copies `source` into `dest`, returning the files written.
fn copy_dir(source: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    std::fs::create_dir_all(dest)?;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| HostflowError::Distribution(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| HostflowError::Distribution(e.to_string()))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
            written.push(target);
        }
    }
    Ok(written)
}
