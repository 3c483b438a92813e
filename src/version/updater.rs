//! Version propagation into downstream files.
//!
//! Each target is read, its recorded version extracted and validated, the
//! new version written back in place of exactly that capture, and the file
//! re-read to confirm. Targets are processed in order with no rollback: a
//! failure on a later target leaves earlier ones already updated.

use super::SdkVersion;
use crate::error::{Result, VersionError};
use crate::events::{EventSink, StepOutcome};
use crate::process::{CommandRunner, CommandSpec};
use regex::Regex;
use std::path::{Path, PathBuf};

/// How a target file records the version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFormat {
    /// A quoted literal following a fixed marker, e.g. `sdk_version: "1.2.3"`
    SourceLiteral {
        /// Text immediately preceding the opening quote
        marker: String,
    },
    /// The first `"version": "…"` entry of a JSON manifest
    JsonManifest,
    /// A `key=value` line of a properties file
    Properties {
        /// Property key
        key: String,
    },
    /// `version = "…"` inside an inline Cargo dependency table
    CargoDependency {
        /// Dependency name
        dependency: String,
    },
}

impl TargetFormat {
    /// `name: "…"` style field
    pub fn field(name: &str) -> Self {
        TargetFormat::SourceLiteral {
            marker: format!("{name}: "),
        }
    }

    /// Literal with an arbitrary marker, e.g. `const VERSION = `
    pub fn literal(marker: &str) -> Self {
        TargetFormat::SourceLiteral {
            marker: marker.to_string(),
        }
    }

    /// `key=value` properties entry
    pub fn property(key: &str) -> Self {
        TargetFormat::Properties {
            key: key.to_string(),
        }
    }

    /// Inline dependency table in a Cargo manifest
    pub fn cargo_dependency(dependency: &str) -> Self {
        TargetFormat::CargoDependency {
            dependency: dependency.to_string(),
        }
    }

    /// Regex whose first capture group is the recorded version
    fn pattern(&self) -> String {
        match self {
            TargetFormat::SourceLiteral { marker } => {
                format!(r#"{}"([^"\n]+)""#, regex::escape(marker))
            }
            TargetFormat::JsonManifest => r#""version"\s*:\s*"([^"\n]+)""#.to_string(),
            TargetFormat::Properties { key } => {
                format!(r"(?m)^[ \t]*{}[ \t]*=[ \t]*([^\s#]+)", regex::escape(key))
            }
            TargetFormat::CargoDependency { dependency } => format!(
                r#"{}\s*=\s*\{{[^}}]*?version\s*=\s*"([^"\n]+)""#,
                regex::escape(dependency)
            ),
        }
    }

    fn regex(&self) -> Result<Regex> {
        let pattern = self.pattern();
        Regex::new(&pattern).map_err(|e| {
            VersionError::InvalidVersion {
                version: pattern,
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Extract the recorded version from `content`
    pub fn extract(&self, content: &str) -> Result<Option<String>> {
        let re = self.regex()?;
        Ok(re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()))
    }

    /// Replace the recorded version, leaving everything else untouched.
    ///
    /// Returns the old value and the rewritten content, or `None` when the
    /// marker is absent.
    pub fn replace(&self, content: &str, new_version: &str) -> Result<Option<(String, String)>> {
        let re = self.regex()?;
        let Some(capture) = re.captures(content).and_then(|c| c.get(1)) else {
            return Ok(None);
        };

        let old = capture.as_str().to_string();
        let mut updated = String::with_capacity(content.len() + new_version.len());
        updated.push_str(&content[..capture.start()]);
        updated.push_str(new_version);
        updated.push_str(&content[capture.end()..]);

        Ok(Some((old, updated)))
    }
}

/// Where a target lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLocation {
    /// A single file relative to the project root
    File(PathBuf),
    /// Every file matching a glob relative to the project root
    Glob {
        /// Pattern relative to the project root
        pattern: String,
        /// Whether zero matches is an error
        required: bool,
    },
}

/// One file (or family of files) to receive the canonical version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTarget {
    /// Display label
    pub label: String,
    /// File location
    pub location: TargetLocation,
    /// How the version is recorded
    pub format: TargetFormat,
}

impl VersionTarget {
    /// Target a single file
    pub fn file(label: &str, path: impl Into<PathBuf>, format: TargetFormat) -> Self {
        Self {
            label: label.to_string(),
            location: TargetLocation::File(path.into()),
            format,
        }
    }

    /// Target every file matching `pattern`; at least one must exist
    pub fn glob(label: &str, pattern: &str, format: TargetFormat) -> Self {
        Self {
            label: label.to_string(),
            location: TargetLocation::Glob {
                pattern: pattern.to_string(),
                required: true,
            },
            format,
        }
    }

    /// Target every file matching `pattern`, if any
    pub fn optional_glob(label: &str, pattern: &str, format: TargetFormat) -> Self {
        Self {
            label: label.to_string(),
            location: TargetLocation::Glob {
                pattern: pattern.to_string(),
                required: false,
            },
            format,
        }
    }

    /// Resolve to concrete files; an empty required glob is a structural violation
    fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>> {
        match &self.location {
            TargetLocation::File(path) => Ok(vec![root.join(path)]),
            TargetLocation::Glob { pattern, required } => {
                let full = format!(
                    "{}/{}",
                    glob::Pattern::escape(&root.to_string_lossy()),
                    pattern
                );
                let entries = glob::glob(&full).map_err(|e| VersionError::InvalidVersion {
                    version: pattern.clone(),
                    reason: format!("invalid glob: {e}"),
                })?;

                let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).collect();
                paths.sort();

                if paths.is_empty() && *required {
                    return Err(VersionError::PatternNotFound {
                        path: root.join(pattern),
                        pattern: pattern.clone(),
                    }
                    .into());
                }
                Ok(paths)
            }
        }
    }
}

/// Record of one file's version transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    /// File that was rewritten
    pub path: PathBuf,
    /// Version recorded before the write
    pub old: String,
    /// Version recorded after the write
    pub new: String,
}

/// Writes the canonical version into a list of targets
pub struct VersionSynchronizer<'a> {
    root: &'a Path,
    sink: &'a dyn EventSink,
}

impl<'a> VersionSynchronizer<'a> {
    /// Create a synchronizer for the project at `root`
    pub fn new(root: &'a Path, sink: &'a dyn EventSink) -> Self {
        Self { root, sink }
    }

    /// Propagate `version` into every target, in order
    pub fn sync(&self, version: &SdkVersion, targets: &[VersionTarget]) -> Result<Vec<VersionChange>> {
        let new = version.to_string();
        let mut changes = Vec::new();

        for target in targets {
            self.sink.step_begin(&format!("Updating {}", target.label));

            let paths = match target.resolve(self.root) {
                Ok(paths) => paths,
                Err(e) => {
                    self.sink.step_failed(&e.to_string());
                    return Err(e);
                }
            };

            if paths.is_empty() {
                log::debug!("No files match {}, skipping", target.label);
                self.sink.step_end_with(
                    &format!("No files for {}", target.label),
                    StepOutcome::Neutral,
                );
                continue;
            }

            for path in paths {
                match update_file(&path, &target.format, &new) {
                    Ok(change) => {
                        self.sink.step_progress(&format!(
                            "{}: {} -> {}",
                            self.display_path(&change.path),
                            change.old,
                            change.new
                        ));
                        changes.push(change);
                    }
                    Err(e) => {
                        self.sink.step_failed(&e.to_string());
                        return Err(e);
                    }
                }
            }

            self.sink.step_end(&format!("Updated {}", target.label));
        }

        Ok(changes)
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Read, extract, validate, rewrite and verify a single file
fn update_file(path: &Path, format: &TargetFormat, new: &str) -> Result<VersionChange> {
    let content = std::fs::read_to_string(path)?;

    let (old, updated) = format
        .replace(&content, new)?
        .ok_or_else(|| VersionError::PatternNotFound {
            path: path.to_path_buf(),
            pattern: format.pattern(),
        })?;

    if semver::Version::parse(&old).is_err() {
        return Err(VersionError::InvalidVersion {
            version: old,
            reason: format!("recorded in {} is not a semantic version", path.display()),
        }
        .into());
    }

    if *format == TargetFormat::JsonManifest {
        verify_manifest(path, &updated, new)?;
    }

    std::fs::write(path, &updated)?;

    let written = std::fs::read_to_string(path)?;
    let found = format.extract(&written)?.unwrap_or_default();
    if found != new {
        return Err(VersionError::VerificationFailed {
            path: path.to_path_buf(),
            expected: new.to_string(),
            found,
        }
        .into());
    }

    log::debug!("{}: {} -> {}", path.display(), old, new);

    Ok(VersionChange {
        path: path.to_path_buf(),
        old,
        new: new.to_string(),
    })
}

/// The rewritten manifest must still parse, with `new` as its top-level version
fn verify_manifest(path: &Path, updated: &str, new: &str) -> Result<()> {
    let manifest: serde_json::Value = serde_json::from_str(updated)?;
    match manifest.get("version").and_then(serde_json::Value::as_str) {
        Some(found) if found == new => Ok(()),
        found => Err(VersionError::VerificationFailed {
            path: path.to_path_buf(),
            expected: new.to_string(),
            found: found.unwrap_or_default().to_string(),
        }
        .into()),
    }
}

/// Refresh the workspace lockfile after inter-package versions changed
pub async fn refresh_lockfile<R: CommandRunner>(
    runner: &R,
    root: &Path,
    sink: &dyn EventSink,
) -> Result<()> {
    sink.step_begin("Verifying Cargo Change");

    let output = runner
        .run(&CommandSpec::new("cargo", root).args(["update", "--workspace"]))
        .await?;

    if !output.success() {
        sink.step_failed("cargo update --workspace failed");
        return Err(VersionError::LockfileRefreshFailed {
            reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
        }
        .into());
    }

    sink.step_end("Cargo Change Verified");
    Ok(())
}
