//! Canonical SDK version handling.
//!
//! The root manifest is the single source of truth for the version of a
//! pipeline run. This module reads it, bumps it, and derives the tag and
//! branch names used downstream.

mod targets;
mod updater;

pub use targets::default_targets;
pub use updater::{
    TargetFormat, TargetLocation, VersionChange, VersionSynchronizer, VersionTarget,
    refresh_lockfile,
};

use crate::error::{Result, VersionError};
use semver::{Prerelease, Version};
use std::fmt;
use std::path::Path;

/// Branch namespace for stable versions
const STABLE_BRANCH_PREFIX: &str = "releases";
/// Branch namespace for prerelease versions
const PRERELEASE_BRANCH_PREFIX: &str = "betas";

/// Canonical SDK version for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdkVersion(Version);

impl SdkVersion {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self> {
        Version::parse(version.trim())
            .map(Self)
            .map_err(|e| {
                VersionError::ParseFailed {
                    version: version.to_string(),
                    source: e,
                }
                .into()
            })
    }

    /// Underlying semver value
    pub fn semver(&self) -> &Version {
        &self.0
    }

    /// Whether a prerelease tag is present
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Release tag name; identical to the canonical string
    pub fn tag(&self) -> String {
        self.to_string()
    }

    /// Branch pushed to mirrored repositories for this version
    pub fn to_branch(&self) -> String {
        let prefix = if self.is_prerelease() {
            PRERELEASE_BRANCH_PREFIX
        } else {
            STABLE_BRANCH_PREFIX
        };
        format!("{prefix}/{}", self.0)
    }

    /// Compute the next version
    pub fn bump(&self, kind: BumpKind) -> Result<Self> {
        let mut next = self.0.clone();
        next.build = semver::BuildMetadata::EMPTY;

        match kind {
            BumpKind::Major => {
                next.major += 1;
                next.minor = 0;
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            BumpKind::Minor => {
                next.minor += 1;
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            BumpKind::Patch => {
                // Releasing a beta promotes it instead of skipping a patch
                if next.pre.is_empty() {
                    next.patch += 1;
                }
                next.pre = Prerelease::EMPTY;
            }
            BumpKind::Beta => {
                let beta = match next.pre.as_str().strip_prefix("beta.") {
                    Some(n) => {
                        let n: u64 = n.parse().map_err(|_| VersionError::InvalidVersion {
                            version: self.to_string(),
                            reason: format!("unsupported prerelease tag '{}'", next.pre),
                        })?;
                        n + 1
                    }
                    None if next.pre.is_empty() => {
                        next.patch += 1;
                        1
                    }
                    None => {
                        return Err(VersionError::InvalidVersion {
                            version: self.to_string(),
                            reason: format!("unsupported prerelease tag '{}'", next.pre),
                        }
                        .into());
                    }
                };
                next.pre = Prerelease::new(&format!("beta.{beta}")).map_err(|e| {
                    VersionError::ParseFailed {
                        version: format!("beta.{beta}"),
                        source: e,
                    }
                })?;
            }
        }

        Ok(Self(next))
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Version> for SdkVersion {
    fn from(version: Version) -> Self {
        Self(version)
    }
}

/// Kind of version bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BumpKind {
    /// Next major version
    Major,
    /// Next minor version
    Minor,
    /// Next patch version
    Patch,
    /// Next beta prerelease
    Beta,
}

/// Read the canonical version from `<root>/Cargo.toml`.
///
/// `[workspace.package].version` wins over `[package].version`. The file is
/// read fresh on every call.
pub fn read_root_version(root: &Path) -> Result<SdkVersion> {
    let manifest = root.join("Cargo.toml");
    let content = std::fs::read_to_string(&manifest)?;
    let value: toml::Table = toml::from_str(&content)?;

    let version = value
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .or_else(|| value.get("package").and_then(|p| p.get("version")))
        .and_then(|v| v.as_str())
        .ok_or(VersionError::MissingRootVersion {
            path: manifest.clone(),
        })?;

    SdkVersion::parse(version)
}

/// Rewrite the canonical version in `<root>/Cargo.toml`, preserving formatting.
pub fn write_root_version(root: &Path, version: &SdkVersion) -> Result<()> {
    let manifest = root.join("Cargo.toml");
    let content = std::fs::read_to_string(&manifest)?;

    let mut doc = content.parse::<toml_edit::DocumentMut>()?;

    let has_workspace_version = doc
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .is_some();

    if has_workspace_version {
        doc["workspace"]["package"]["version"] = toml_edit::value(version.to_string());
    } else if doc.get("package").and_then(|p| p.get("version")).is_some() {
        doc["package"]["version"] = toml_edit::value(version.to_string());
    } else {
        return Err(VersionError::MissingRootVersion { path: manifest }.into());
    }

    std::fs::write(&manifest, doc.to_string())?;
    Ok(())
}
