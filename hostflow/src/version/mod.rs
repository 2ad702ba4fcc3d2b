//! Persisted build version.
//!
//! The version is a plain-text `major.minor.patch` file. Reading never fails:
//! missing or malformed content yields [`BuildVersion::DEFAULT`]. Only the
//! patch component is ever bumped by the pipeline.

use crate::errors::{HostflowError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("version pattern is valid"));

/// A `major.minor.patch` build version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl BuildVersion {
    /// Version used when nothing valid is persisted.
    pub const DEFAULT: Self = Self::new(0, 1, 0);

    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Returns the version with the patch component incremented.
    pub fn next_patch(&self) -> Result<Self> {
        let patch = self.patch.checked_add(1).ok_or_else(|| {
            HostflowError::malformed_version(self.to_string(), "patch component overflows")
        })?;
        Ok(Self { patch, ..*self })
    }
}

impl Default for BuildVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for BuildVersion {
    type Err = HostflowError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let caps = VERSION_PATTERN.captures(trimmed).ok_or_else(|| {
            HostflowError::malformed_version(trimmed, "expected exactly three integer components")
        })?;

        let component = |i: usize| -> Result<u32> {
            caps[i]
                .parse::<u32>()
                .map_err(|e| HostflowError::malformed_version(trimmed, e.to_string()))
        };

        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }
}

impl Serialize for BuildVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BuildVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Increments the patch of a textual version.
///
/// Anything other than exactly three integer components is rejected and
/// logged; the caller keeps its current version in that case.
pub fn increment_text(raw: &str) -> Result<BuildVersion> {
    let parsed: BuildVersion = raw.parse().inspect_err(|e| {
        error!(error = %e, "Cannot increment build version");
    })?;
    parsed.next_patch()
}

/// Reads and writes the persisted version file.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted version, defaulting to `0.1.0`.
    #[must_use]
    pub fn load(&self) -> BuildVersion {
        match read_version(&self.path) {
            Some(version) => {
                debug!(path = %self.path.display(), %version, "Loaded build version");
                version
            }
            None => {
                info!(
                    path = %self.path.display(),
                    default = %BuildVersion::DEFAULT,
                    "No valid build version found, using default"
                );
                BuildVersion::DEFAULT
            }
        }
    }

    /// Returns `version` with the patch bumped, or `version` unchanged if it
    /// cannot be bumped.
    #[must_use]
    pub fn increment(version: &BuildVersion) -> BuildVersion {
        match version.next_patch() {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "Build version left unchanged");
                *version
            }
        }
    }

    /// Writes `major.minor.patch`, replacing any prior content.
    pub fn save(&self, version: &BuildVersion) -> Result<()> {
        write_version(&self.path, version)?;
        info!(path = %self.path.display(), %version, "Saved build version");
        Ok(())
    }

    /// Propagates the project-side copy to this store.
    ///
    /// The project copy is what the host wrote. If it is missing, malformed,
    /// or older than `fallback` (left over from an earlier run), `fallback`
    /// is persisted instead. Returns the version that was saved.
    pub fn sync_from_project(&self, project_copy: &Path, fallback: BuildVersion) -> Result<BuildVersion> {
        let version = match read_version(project_copy) {
            Some(version) if version >= fallback => version,
            Some(stale) => {
                warn!(path = %project_copy.display(), %stale, %fallback, "Project version copy is stale, using controller value");
                fallback
            }
            None => {
                warn!(
                    path = %project_copy.display(),
                    %fallback,
                    "Project version copy unreadable, using controller value"
                );
                fallback
            }
        };
        self.save(&version)?;
        Ok(version)
    }
}

/// Writes a version file, creating parent directories.
pub fn write_version(path: &Path, version: &BuildVersion) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, version.to_string())?;
    Ok(())
}

fn read_version(path: &Path) -> Option<BuildVersion> {
    let content = std::fs::read_to_string(path).ok()?;
    match content.parse() {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed build version");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_and_display() {
        let v: BuildVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, BuildVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
        assert_eq!(" 4.5.6\n".parse::<BuildVersion>().unwrap(), BuildVersion::new(4, 5, 6));
    }

    #[test]
    fn test_parse_rejects_other_arrangements() {
        for raw in ["", "1.2", "1.2.3.4", "a.b.c", "1.-2.3", "v1.2.3", "1.2.3-beta"] {
            assert!(raw.parse::<BuildVersion>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_increment_only_bumps_patch() {
        assert_eq!(increment_text("1.2.3").unwrap(), BuildVersion::new(1, 2, 4));
        assert!(increment_text("1.2").is_err());

        let max = BuildVersion::new(1, 0, u32::MAX);
        assert_eq!(VersionStore::increment(&max), max);
    }

    #[test]
    fn test_round_trip_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build_version.txt");
        std::fs::write(&path, "1.2.3").unwrap();

        let store = VersionStore::new(&path);
        store.save(&VersionStore::increment(&store.load())).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1.2.4");
    }

    #[test]
    fn test_round_trip_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("build_version.txt");

        let store = VersionStore::new(&path);
        assert_eq!(store.load(), BuildVersion::DEFAULT);
        store.save(&VersionStore::increment(&store.load())).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.1.1");
    }

    #[test]
    fn test_malformed_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build_version.txt");
        std::fs::write(&path, "not a version").unwrap();

        assert_eq!(VersionStore::new(&path).load(), BuildVersion::DEFAULT);
    }

    #[test]
    fn test_sync_from_project() {
        let dir = TempDir::new().unwrap();
        let root = VersionStore::new(dir.path().join("build_version.txt"));
        let project_copy = dir.path().join("proj/Assets/Resources/build_version.txt");

        let saved = root.sync_from_project(&project_copy, BuildVersion::new(0, 1, 1)).unwrap();
        assert_eq!(saved, BuildVersion::new(0, 1, 1));

        write_version(&project_copy, &BuildVersion::new(0, 2, 0)).unwrap();
        let saved = root.sync_from_project(&project_copy, BuildVersion::new(0, 1, 1)).unwrap();
        assert_eq!(saved, BuildVersion::new(0, 2, 0));
        assert_eq!(root.load(), BuildVersion::new(0, 2, 0));

        // A copy from an earlier run never rolls the root back.
        let saved = root.sync_from_project(&project_copy, BuildVersion::new(0, 2, 1)).unwrap();
        assert_eq!(saved, BuildVersion::new(0, 2, 1));
        assert_eq!(root.load(), BuildVersion::new(0, 2, 1));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&BuildVersion::new(0, 1, 0)).unwrap();
        assert_eq!(json, r#""0.1.0""#);
        let back: BuildVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BuildVersion::DEFAULT);
        assert!(serde_json::from_str::<BuildVersion>(r#""0.1""#).is_err());
    }
}
