//! GitHub integration: authentication, REST client and release registry

mod auth;
mod client;
mod models;
mod registry;

pub use auth::{InstallationToken, app_jwt, installation_token};
pub use client::{GitHubClient, ReleaseApi};
pub use models::{
    ArtifactPayload, Asset, CreateReleaseRequest, GitObject, GitRef, Release, RepoRef,
    WorkflowArtifact, WorkflowRun,
};
pub use registry::{Branch, ReleaseLifecycle, ReleaseRegistry, ReleaseStage};
