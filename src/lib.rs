//! # SDK Release
//!
//! Release publishing and version synchronization for a multi-language SDK
//! distribution built from one Rust workspace.
//!
//! The root manifest holds the canonical version. From there the pipeline
//! propagates it into every language package, mirrors package subdirectories
//! into their downstream repositories, and publishes GitHub releases with
//! the compiled native libraries attached.
//!
//! ## Features
//!
//! - **Version Synchronization**: One version written into manifests, source literals and properties files
//! - **Repository Mirroring**: Subdirectories committed on top of their upstream history via system git
//! - **Release Registry**: Existence checks that keep publishes idempotent per version
//! - **Artifact Transport**: Concurrent asset uploads and workflow artifact downloads
//! - **GitHub App Auth**: Installation tokens minted from an app JWT
//!
//! ## Usage
//!
//! ```bash
//! sdk_release bump-version beta                  # Bump to the next beta
//! sdk_release sync-version --commit-and-push     # Propagate and push
//! sdk_release publish --package php --workflow-id 123456789
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod github;
pub mod process;
pub mod publish;
pub mod version;

#[cfg(test)]
mod testing;

// Re-export main types for public API
pub use artifacts::{ArtifactTransport, UploadOutcome};
pub use cli::Args;
pub use config::{EnvConfig, GitHubCredentials, PipelineConfig};
pub use error::{CliError, ReleaseError, Result};
pub use events::{Event, EventSink, StepOutcome};
pub use git::RepositoryMirror;
pub use github::{GitHubClient, ReleaseApi, ReleaseRegistry};
pub use publish::{PublishCoordinator, PublishReport, PublishTarget};
pub use version::{SdkVersion, VersionSynchronizer};
