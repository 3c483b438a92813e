//! Release and branch bookkeeping keyed by version.
//!
//! Creation is guarded by check-then-act: a lookup immediately before every
//! create. Nothing here relies on the remote rejecting duplicates, so two
//! concurrent runs for the same version are not safe.

use super::client::ReleaseApi;
use super::models::{CreateReleaseRequest, Release, RepoRef};
use crate::error::{GitHubError, Result};
use crate::version::SdkVersion;
use std::fmt;
use std::sync::Arc;

/// A branch that exists upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Owning repository
    pub repo: RepoRef,
    /// Short branch name, e.g. `releases/1.2.3`
    pub name: String,
    /// Commit at the branch head
    pub head_sha: String,
}

/// Idempotent lookup and creation of releases and version branches
#[derive(Debug)]
pub struct ReleaseRegistry<A> {
    api: Arc<A>,
}

impl<A> Clone for ReleaseRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: ReleaseApi> ReleaseRegistry<A> {
    /// Wrap a release service
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Release tagged with `version`, if any
    pub async fn find_release(&self, repo: &RepoRef, version: &SdkVersion) -> Result<Option<Release>> {
        self.api.get_release_by_tag(repo, &version.tag()).await
    }

    /// Branch named after `version`, if any
    pub async fn find_branch(&self, repo: &RepoRef, version: &SdkVersion) -> Result<Option<Branch>> {
        let name = version.to_branch();
        let found = self.api.get_branch_ref(repo, &name).await?;
        Ok(found.map(|r| Branch {
            repo: repo.clone(),
            name,
            head_sha: r.object.sha,
        }))
    }

    /// Fail with [`GitHubError::BranchExists`] if the version branch was pushed already
    pub async fn ensure_branch_absent(&self, repo: &RepoRef, version: &SdkVersion) -> Result<()> {
        match self.find_branch(repo, version).await? {
            Some(branch) => Err(GitHubError::BranchExists {
                repo: repo.to_string(),
                branch: branch.name,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Fail with [`GitHubError::DuplicateRelease`] if a release for the version exists
    pub async fn ensure_release_absent(&self, repo: &RepoRef, version: &SdkVersion) -> Result<()> {
        match self.find_release(repo, version).await? {
            Some(release) => Err(duplicate(repo, &release)),
            None => Ok(()),
        }
    }

    /// The version branch, which must exist
    pub async fn require_branch(&self, repo: &RepoRef, version: &SdkVersion) -> Result<Branch> {
        self.find_branch(repo, version).await?.ok_or_else(|| {
            GitHubError::BranchNotFound {
                repo: repo.to_string(),
                branch: version.to_branch(),
            }
            .into()
        })
    }

    /// The release for the version, which must exist
    pub async fn require_release(&self, repo: &RepoRef, version: &SdkVersion) -> Result<Release> {
        self.find_release(repo, version).await?.ok_or_else(|| {
            GitHubError::ReleaseNotFound {
                repo: repo.to_string(),
                tag: version.tag(),
            }
            .into()
        })
    }

    /// Create the release for `version`.
    ///
    /// Looks the tag up first and fails with [`GitHubError::DuplicateRelease`]
    /// if it is already taken. The prerelease flag follows the version.
    pub async fn create_release(
        &self,
        repo: &RepoRef,
        version: &SdkVersion,
        target_commit: Option<&str>,
    ) -> Result<Release> {
        if let Some(existing) = self.find_release(repo, version).await? {
            return Err(duplicate(repo, &existing));
        }

        let request = CreateReleaseRequest {
            tag_name: version.tag(),
            target_commitish: target_commit.map(str::to_string),
            name: Some(version.tag()),
            prerelease: version.is_prerelease(),
        };

        log::info!(
            "Creating release {} in {} (prerelease: {})",
            request.tag_name,
            repo,
            request.prerelease
        );
        self.api.create_release(repo, &request).await
    }
}

fn duplicate(repo: &RepoRef, release: &Release) -> crate::error::ReleaseError {
    GitHubError::DuplicateRelease {
        repo: repo.to_string(),
        tag: release.tag_name.clone(),
        url: release.html_url.clone(),
    }
    .into()
}

/// Publication stage of one (repository, version) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReleaseStage {
    /// Nothing published yet
    Absent,
    /// Version branch pushed upstream
    BranchPushed,
    /// Release created
    Created,
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseStage::Absent => "absent",
            ReleaseStage::BranchPushed => "branch-pushed",
            ReleaseStage::Created => "created",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of one (repository, version) pair.
///
/// Stages only move forward; redoing or skipping back is an error.
#[derive(Debug, Clone)]
pub struct ReleaseLifecycle {
    repo: RepoRef,
    version: SdkVersion,
    stage: ReleaseStage,
}

impl ReleaseLifecycle {
    /// Start tracking at [`ReleaseStage::Absent`]
    pub fn new(repo: RepoRef, version: SdkVersion) -> Self {
        Self {
            repo,
            version,
            stage: ReleaseStage::Absent,
        }
    }

    /// Current stage
    pub fn stage(&self) -> ReleaseStage {
        self.stage
    }

    /// Move to `next`, which must be strictly later than the current stage
    pub fn advance(&mut self, next: ReleaseStage) -> Result<()> {
        if next <= self.stage {
            return Err(GitHubError::InvalidTransition {
                repo: self.repo.to_string(),
                version: self.version.to_string(),
                from: self.stage.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.stage = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use crate::testing::FakeReleaseApi;

    fn repo() -> RepoRef {
        RepoRef::new("statsig-io", "statsig-php-core")
    }

    fn v(s: &str) -> SdkVersion {
        SdkVersion::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_lookups_on_empty_repo_return_none() {
        let registry = ReleaseRegistry::new(Arc::new(FakeReleaseApi::new()));
        assert!(registry.find_release(&repo(), &v("1.0.0")).await.unwrap().is_none());
        assert!(registry.find_branch(&repo(), &v("1.0.0")).await.unwrap().is_none());
        registry.ensure_branch_absent(&repo(), &v("1.0.0")).await.unwrap();
        registry.ensure_release_absent(&repo(), &v("1.0.0")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_release_derives_prerelease() {
        let api = Arc::new(FakeReleaseApi::new());
        let registry = ReleaseRegistry::new(Arc::clone(&api));

        let beta = registry
            .create_release(&repo(), &v("2.0.0-beta.3"), Some("abc"))
            .await
            .unwrap();
        assert!(beta.prerelease);
        assert_eq!(beta.tag_name, "2.0.0-beta.3");
        assert_eq!(beta.target_commitish.as_deref(), Some("abc"));

        let stable = registry.create_release(&repo(), &v("2.0.0"), None).await.unwrap();
        assert!(!stable.prerelease);
        assert_eq!(api.releases().len(), 2);
    }

    #[tokio::test]
    async fn test_second_create_is_duplicate() {
        let api = Arc::new(FakeReleaseApi::new());
        let registry = ReleaseRegistry::new(Arc::clone(&api));

        registry.create_release(&repo(), &v("1.0.0"), None).await.unwrap();
        let err = registry
            .create_release(&repo(), &v("1.0.0"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::GitHub(GitHubError::DuplicateRelease { .. })
        ));
        assert_eq!(api.releases().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_branch_is_conflict() {
        let api = Arc::new(FakeReleaseApi::new().with_branch(&repo(), "betas/1.0.0-beta.1", "sha1"));
        let registry = ReleaseRegistry::new(api);

        let err = registry
            .ensure_branch_absent(&repo(), &v("1.0.0-beta.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::GitHub(GitHubError::BranchExists { .. })));

        let branch = registry.require_branch(&repo(), &v("1.0.0-beta.1")).await.unwrap();
        assert_eq!(branch.head_sha, "sha1");
    }

    #[tokio::test]
    async fn test_require_missing_branch_fails() {
        let registry = ReleaseRegistry::new(Arc::new(FakeReleaseApi::new()));
        let err = registry.require_branch(&repo(), &v("1.0.0")).await.unwrap_err();
        assert!(matches!(err, ReleaseError::GitHub(GitHubError::BranchNotFound { .. })));
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let mut lifecycle = ReleaseLifecycle::new(repo(), v("1.0.0"));
        lifecycle.advance(ReleaseStage::BranchPushed).unwrap();
        assert!(lifecycle.advance(ReleaseStage::BranchPushed).is_err());
        lifecycle.advance(ReleaseStage::Created).unwrap();
        assert!(lifecycle.advance(ReleaseStage::Absent).is_err());
        assert_eq!(lifecycle.stage(), ReleaseStage::Created);
    }
}
