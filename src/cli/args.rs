//! Command line argument parsing and validation.

use crate::version::BumpKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release publishing and version synchronization for the SDK distribution
#[derive(Parser, Debug)]
#[command(
    name = "sdk_release",
    version,
    about = "Release publishing and version synchronization for the SDK distribution",
    long_about = "Propagate the root version into every package manifest, mirror
subdirectories into their downstream repositories and publish GitHub releases.

GitHub commands authenticate as a GitHub App and require
GH_APP_ID, GH_APP_INSTALLATION_ID and GH_APP_PRIVATE_KEY.

Usage:
  sdk_release sync-version
  sdk_release bump-version beta
  sdk_release publish --package php --workflow-id 123456789"
)]
pub struct Args {
    /// Project root (defaults to the nearest Cargo workspace above the current directory)
    #[arg(long, global = true, env = "SDK_RELEASE_ROOT", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Show recovery suggestions and command details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write the root version into every package that records it
    SyncVersion {
        /// Commit the result and push it
        #[arg(long)]
        commit_and_push: bool,

        /// Do not run `cargo update --workspace` afterwards
        #[arg(long)]
        no_lockfile_refresh: bool,
    },

    /// Bump the root version
    BumpVersion {
        /// Which component to bump
        #[arg(value_enum)]
        kind: BumpKind,
    },

    /// Create the release for the root version; its branch must already exist
    CreateRelease {
        /// Repository name, e.g. statsig-php-core
        #[arg(long)]
        repo: String,
    },

    /// Commit a subdirectory into its downstream repository and push the version branch
    PushMirror {
        /// Downstream repository name
        #[arg(long)]
        repo: String,

        /// Project subdirectory to mirror
        #[arg(long, value_name = "DIR")]
        subdir: PathBuf,

        /// Commit locally but do not push
        #[arg(long)]
        skip_push: bool,
    },

    /// Attach a file to the release for the root version, replacing a same-named asset
    AttachAssets {
        /// Repository name
        #[arg(long)]
        repo: String,

        /// File to attach, relative to the project root
        #[arg(value_name = "ASSET_PATH")]
        asset_path: PathBuf,
    },

    /// Zip every native library under a directory, one archive per library
    ZipFiles {
        /// Directory to search
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Archive name prefix
        #[arg(long, default_value = "statsig-core")]
        package: String,

        /// Where to write the archives (defaults to DIR)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Publish a package: mirror, release and upload its binaries
    Publish {
        /// Package to publish
        #[arg(long)]
        package: String,

        /// Workflow run whose artifacts hold the binaries
        #[arg(long)]
        workflow_id: Option<u64>,

        /// Repository the workflow ran in
        #[arg(long, default_value = "private-statsig-server-core")]
        repository: String,

        /// Directory already holding the binaries (instead of --workflow-id)
        #[arg(long, value_name = "DIR")]
        working_dir: Option<PathBuf>,

        /// Commit mirrored repositories but do not push them
        #[arg(long)]
        skip_push: bool,
    },
}

impl Command {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::SyncVersion { .. } => "sync-version",
            Command::BumpVersion { .. } => "bump-version",
            Command::CreateRelease { .. } => "create-release",
            Command::PushMirror { .. } => "push-mirror",
            Command::AttachAssets { .. } => "attach-assets",
            Command::ZipFiles { .. } => "zip-files",
            Command::Publish { .. } => "publish",
        }
    }

    /// Whether the command talks to GitHub
    pub fn needs_credentials(&self) -> bool {
        matches!(
            self,
            Command::CreateRelease { .. }
                | Command::PushMirror { .. }
                | Command::AttachAssets { .. }
                | Command::Publish { .. }
        )
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Publish {
                workflow_id: None,
                working_dir: None,
                ..
            } => Err("publish needs --workflow-id or --working-dir".to_string()),
            Command::Publish {
                workflow_id: Some(_),
                working_dir: Some(_),
                ..
            } => Err("--workflow-id and --working-dir are mutually exclusive".to_string()),
            Command::CreateRelease { repo }
            | Command::PushMirror { repo, .. }
            | Command::AttachAssets { repo, .. }
                if repo.trim().is_empty() =>
            {
                Err("--repo must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}
