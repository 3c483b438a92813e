//! Error types for release publishing and version synchronization.
//!
//! Every failure is classified into one of the pipeline's error kinds so the
//! top-level boundary can decide between "stop the run" and "carry on".

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sdk_release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all sdk_release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Version reading / propagation errors
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Local git / mirror repository errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Remote release service errors
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// Artifact upload / download errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Missing credentials or invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML editing errors
    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Archive errors
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Version management errors
#[derive(Error, Debug)]
pub enum VersionError {
    /// The expected version marker is absent from a target file
    #[error("Version marker '{pattern}' not found in {path}")]
    PatternNotFound {
        /// File that was searched
        path: PathBuf,
        /// Pattern that failed to match
        pattern: String,
    },

    /// Invalid version format
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// Version string
        version: String,
        /// Reason for the error
        reason: String,
    },

    /// Version parsing failed
    #[error("Failed to parse version '{version}': {source}")]
    ParseFailed {
        /// Version string
        version: String,
        /// Parsing error
        #[source]
        source: semver::Error,
    },

    /// Re-reading a target after the write did not yield the new version
    #[error("Version verification failed for {path}: expected {expected}, found {found}")]
    VerificationFailed {
        /// Target file
        path: PathBuf,
        /// Version that was written
        expected: String,
        /// Version that was read back
        found: String,
    },

    /// Root manifest has no version field
    #[error("No version found in {path}")]
    MissingRootVersion {
        /// Path to the root Cargo.toml
        path: PathBuf,
    },

    /// `cargo update --workspace` failed after propagation
    #[error("Lockfile refresh failed: {reason}")]
    LockfileRefreshFailed {
        /// Captured stderr or exit status
        reason: String,
    },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Working tree was clean, nothing to commit
    #[error("No changes to commit in {path}")]
    NoChanges {
        /// Repository path
        path: PathBuf,
    },

    /// A git subprocess exited non-zero
    #[error("git {command} failed: {stderr}")]
    CommandFailed {
        /// Arguments passed to git
        command: String,
        /// Captured stderr
        stderr: String,
    },

    /// Mirror source directory is missing
    #[error("Mirror source directory not found: {path}")]
    SourceMissing {
        /// Directory that was expected
        path: PathBuf,
    },
}

/// Remote release service errors
#[derive(Error, Debug)]
pub enum GitHubError {
    /// A release already exists for the version
    #[error("Release {tag} already exists in {repo}: {url}")]
    DuplicateRelease {
        /// Repository (owner/name)
        repo: String,
        /// Release tag
        tag: String,
        /// Release page
        url: String,
    },

    /// The version branch already exists upstream
    #[error("Branch {branch} already exists in {repo}")]
    BranchExists {
        /// Repository (owner/name)
        repo: String,
        /// Branch name
        branch: String,
    },

    /// The version branch was required but is absent
    #[error("Branch {branch} does not exist in {repo}")]
    BranchNotFound {
        /// Repository (owner/name)
        repo: String,
        /// Branch name
        branch: String,
    },

    /// No release exists for the version
    #[error("Release {tag} not found in {repo}")]
    ReleaseNotFound {
        /// Repository (owner/name)
        repo: String,
        /// Release tag
        tag: String,
    },

    /// Workflow run could not be found
    #[error("Workflow run {run_id} not found")]
    WorkflowRunNotFound {
        /// Run id
        run_id: u64,
    },

    /// Workflow run has not completed successfully
    #[error("Workflow run {run_id} is not usable (status: {status}, conclusion: {conclusion})")]
    WorkflowRunNotSuccessful {
        /// Run id
        run_id: u64,
        /// Reported status
        status: String,
        /// Reported conclusion
        conclusion: String,
    },

    /// Non-success HTTP response
    #[error("{operation} returned {status}: {message}")]
    Api {
        /// Operation name
        operation: String,
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// Installation token exchange failed
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// Reason for the error
        reason: String,
    },

    /// A release lifecycle transition was attempted out of order
    #[error("Invalid release transition for {repo}@{version}: {from} -> {to}")]
    InvalidTransition {
        /// Repository (owner/name)
        repo: String,
        /// Version string
        version: String,
        /// Current stage
        from: String,
        /// Requested stage
        to: String,
    },
}

/// Artifact transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// One or more requested artifacts did not download
    #[error("Failed to download all artifacts, missing: {}", missing.join(", "))]
    PartialDownload {
        /// Names of the artifacts that failed or came back empty
        missing: Vec<String>,
    },

    /// One or more uploads failed
    #[error("Failed to upload assets: {}", failed.join(", "))]
    UploadFailed {
        /// Names of the assets that failed
        failed: Vec<String>,
    },

    /// Local file is not a usable artifact
    #[error("Invalid artifact {path}: {reason}")]
    InvalidArtifact {
        /// Artifact path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Working directory holds no native library to publish
    #[error("No native libraries found in {dir}")]
    NoBinaries {
        /// Directory that was searched
        dir: PathBuf,
    },

    /// Background transfer task failed to join
    #[error("Transfer task failed: {reason}")]
    TaskFailed {
        /// Join error
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required credential environment variable is absent
    #[error("{name} is not set")]
    MissingCredential {
        /// Environment variable name
        name: String,
    },

    /// A configuration value is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Setting name
        name: String,
        /// Reason for the error
        reason: String,
    },

    /// Project root could not be located
    #[error("Could not find project root from {start}")]
    RootNotFound {
        /// Directory the search started from
        start: PathBuf,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// Error taxonomy used to decide how a failure propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Branch or release already exists; proceeding would double-publish
    PreconditionConflict,
    /// Empty commit; the pipeline continues
    BenignNoOp,
    /// Upload or download failure
    Transport,
    /// Expected version marker missing from a target file
    StructuralViolation,
    /// Missing credentials or configuration
    Configuration,
    /// Anything else
    Other,
}

impl ReleaseError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::GitHub(
                GitHubError::DuplicateRelease { .. }
                | GitHubError::BranchExists { .. }
                | GitHubError::InvalidTransition { .. },
            ) => ErrorKind::PreconditionConflict,
            ReleaseError::Git(GitError::NoChanges { .. }) => ErrorKind::BenignNoOp,
            ReleaseError::Transport(_) | ReleaseError::Http(_) => ErrorKind::Transport,
            ReleaseError::Version(VersionError::PatternNotFound { .. }) => {
                ErrorKind::StructuralViolation
            }
            ReleaseError::Config(_) => ErrorKind::Configuration,
            _ => ErrorKind::Other,
        }
    }

    /// True only for failures the pipeline recovers from locally
    pub fn is_benign(&self) -> bool {
        self.kind() == ErrorKind::BenignNoOp
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::GitHub(GitHubError::DuplicateRelease { url, .. }) => vec![
                format!("Inspect the existing release: {url}"),
                "Bump the root version before publishing again".to_string(),
            ],
            ReleaseError::GitHub(GitHubError::BranchExists { repo, branch }) => vec![
                format!("Branch {branch} was already pushed to {repo}"),
                "Delete the branch manually if the previous publish was aborted".to_string(),
            ],
            ReleaseError::Version(VersionError::PatternNotFound { path, .. }) => vec![
                format!("Check that {} still records the SDK version", path.display()),
            ],
            ReleaseError::Config(ConfigError::MissingCredential { name }) => vec![
                format!("Export {name} before running this command"),
                "GH_APP_ID, GH_APP_INSTALLATION_ID and GH_APP_PRIVATE_KEY are all required"
                    .to_string(),
            ],
            ReleaseError::Transport(TransportError::UploadFailed { .. }) => vec![
                "The release is partially populated; review its assets before re-running"
                    .to_string(),
                "attach-assets replaces an asset with the same name".to_string(),
            ],
            ReleaseError::Transport(TransportError::NoBinaries { dir }) => vec![
                format!("Place the .a, .so, .dylib or .dll builds under {}", dir.display()),
                "Or publish from a workflow run with --workflow-id".to_string(),
            ],
            ReleaseError::Transport(TransportError::PartialDownload { .. }) => vec![
                "Verify the workflow run still retains its artifacts".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
