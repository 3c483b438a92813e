//! Wire models for the GitHub REST endpoints the pipeline uses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository under an owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RepoRef {
    /// Organisation or user
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepoRef {
    /// Create a reference to `owner/name`
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A GitHub release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Unique id
    pub id: u64,
    /// Tag; always the canonical version string
    pub tag_name: String,
    /// Commit or branch the tag points at
    #[serde(default)]
    pub target_commitish: Option<String>,
    /// Prerelease flag
    #[serde(default)]
    pub prerelease: bool,
    /// Asset upload endpoint (RFC 6570 template)
    #[serde(default)]
    pub upload_url: String,
    /// Release page
    #[serde(default)]
    pub html_url: String,
    /// Owning repository; filled in by the client, not part of the payload
    #[serde(skip)]
    pub repo: RepoRef,
}

impl Release {
    /// Upload endpoint with the `{?name,label}` template suffix removed
    pub fn upload_endpoint(&self) -> Option<&str> {
        let url = self.upload_url.split('{').next()?.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// An asset attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Unique id
    pub id: u64,
    /// File name
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Public download link
    #[serde(default)]
    pub browser_download_url: String,
}

/// Object a git ref points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitObject {
    /// Commit sha
    pub sha: String,
}

/// Response of `GET /repos/{owner}/{repo}/git/ref/{ref}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// Fully qualified ref, e.g. `refs/heads/releases/1.0.0`
    #[serde(rename = "ref")]
    pub reference: String,
    /// Target object
    pub object: GitObject,
}

/// A CI workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run id
    pub id: u64,
    /// `queued`, `in_progress`, `completed`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// `success`, `failure`, ... once completed
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl WorkflowRun {
    /// Only completed, successful runs may feed a publish
    pub fn is_successful(&self) -> bool {
        self.status.as_deref() == Some("completed") && self.conclusion.as_deref() == Some("success")
    }
}

/// An artifact produced by a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowArtifact {
    /// Artifact id
    pub id: u64,
    /// Artifact name
    pub name: String,
    /// Archive size
    #[serde(default)]
    pub size_in_bytes: u64,
    /// Whether the artifact has expired
    #[serde(default)]
    pub expired: bool,
}

/// Page of `GET /repos/{owner}/{repo}/actions/runs/{id}/artifacts`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArtifactList {
    #[serde(default)]
    pub artifacts: Vec<WorkflowArtifact>,
}

/// Raw artifact archive and the URL it was served from
#[derive(Debug, Clone)]
pub struct ArtifactPayload {
    /// Zip archive bytes
    pub data: Bytes,
    /// Final (post-redirect) download URL
    pub url: String,
}

/// Body of `POST /repos/{owner}/{repo}/releases`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReleaseRequest {
    /// Tag to create
    pub tag_name: String,
    /// Commit the tag should point at; the default branch when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_commitish: Option<String>,
    /// Release title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Prerelease flag
    pub prerelease: bool,
}
