//! Downstream mirror repositories driven through system git.
//!
//! A mirror is a subdirectory of the project that gets its own `.git`,
//! pointed at an independent upstream repository. Publishing commits the
//! subdirectory's current contents on top of the upstream history and pushes
//! them to a version-named branch.
//!
//! Installation tokens never land in `.git/config`: the stored remote is the
//! plain URL and the token is spliced into the URL of each fetch and push.

use crate::error::{GitError, Result};
use crate::events::EventSink;
use crate::process::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};

/// Local branch a freshly initialised mirror starts on
pub const DEFAULT_LOCAL_BRANCH: &str = "master";

/// What to commit and where to push it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Working copy to commit in
    pub repo_path: PathBuf,
    /// Commit message
    pub message: String,
    /// Remote name
    pub remote: String,
    /// Local branch to push from
    pub local_branch: String,
    /// Remote branch to create
    pub remote_branch: String,
    /// Push after committing
    pub push: bool,
    /// Tag to create on the new commit (pushed along with the branch)
    pub tag: Option<String>,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Sha of the new commit
    pub commit_sha: String,
    /// Whether the branch was pushed
    pub pushed: bool,
}

/// Creates and publishes mirror working copies
pub struct RepositoryMirror<'a, R> {
    runner: &'a R,
    sink: &'a dyn EventSink,
    remote_base: String,
    token: Option<String>,
}

impl<'a, R: CommandRunner> RepositoryMirror<'a, R> {
    /// Mirrors whose upstream lives under `https://github.com/<owner>`
    pub fn new(runner: &'a R, owner: &str, sink: &'a dyn EventSink) -> Self {
        Self {
            runner,
            sink,
            remote_base: format!("https://github.com/{owner}"),
            token: None,
        }
    }

    /// Use a different upstream base, e.g. a local directory of bare repos
    pub fn with_remote_base(mut self, base: &str) -> Self {
        self.remote_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Authenticate fetches and pushes with an installation token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Clone URL of `repo`, without credentials
    pub fn remote_url(&self, repo: &str) -> String {
        format!("{}/{}.git", self.remote_base, repo)
    }

    /// `url` carrying the installation token, when there is one
    fn authenticated(&self, url: &str) -> String {
        match (&self.token, url.strip_prefix("https://")) {
            (Some(token), Some(rest)) => {
                // Drop any userinfo a remote was configured with
                let authority_end = rest.find('/').unwrap_or(rest.len());
                let host_start = rest[..authority_end].rfind('@').map_or(0, |at| at + 1);
                format!("https://x-access-token:{token}@{}", &rest[host_start..])
            }
            _ => url.to_string(),
        }
    }

    /// Make `source_subdir` a working copy of `dest_repo`.
    ///
    /// An existing `.git` is reused with `origin` reset to the plain URL.
    /// Otherwise the directory is initialised, given `origin`, and
    /// soft-reset onto the upstream `master` so the next commit lands on top
    /// of the published history.
    pub async fn ensure_mirror(&self, source_subdir: &Path, dest_repo: &str) -> Result<PathBuf> {
        if !source_subdir.is_dir() {
            return Err(GitError::SourceMissing {
                path: source_subdir.to_path_buf(),
            }
            .into());
        }

        if source_subdir.join(".git").exists() {
            log::debug!("Reusing mirror at {}", source_subdir.display());
            self.git(
                source_subdir,
                &["remote", "set-url", "origin", &self.remote_url(dest_repo)],
            )
            .await?;
            self.sink
                .step_progress(&format!("Reusing working copy {}", source_subdir.display()));
            return Ok(source_subdir.to_path_buf());
        }

        let branch_arg = format!("--initial-branch={DEFAULT_LOCAL_BRANCH}");
        self.git(source_subdir, &["init", &branch_arg]).await?;
        self.git(source_subdir, &["remote", "add", "origin", &self.remote_url(dest_repo)])
            .await?;

        // An empty upstream has nothing to fetch
        let upstream = format!("origin/{DEFAULT_LOCAL_BRANCH}");
        let fetch_url = self.authenticated(&self.remote_url(dest_repo));
        if self
            .try_git(source_subdir, &["fetch", &fetch_url, "+refs/heads/*:refs/remotes/origin/*"])
            .await?
            && self
                .try_git(source_subdir, &["rev-parse", "--verify", "--quiet", &upstream])
                .await?
        {
            self.git(source_subdir, &["reset", "--soft", &upstream]).await?;
        } else {
            log::warn!("{dest_repo} has no upstream history, starting fresh");
        }

        self.sink
            .step_progress(&format!("Initialised {} for {dest_repo}", source_subdir.display()));
        Ok(source_subdir.to_path_buf())
    }

    /// Stage everything, commit, and optionally push.
    ///
    /// A clean tree fails with [`GitError::NoChanges`]. The remote branch is
    /// created by the push; checking that it does not already exist is the
    /// caller's job.
    pub async fn commit_and_push(&self, request: &CommitRequest) -> Result<CommitOutcome> {
        let repo = request.repo_path.as_path();

        self.git(repo, &["add", "-A"]).await?;
        let status = self.git(repo, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Err(GitError::NoChanges {
                path: repo.to_path_buf(),
            }
            .into());
        }

        self.git(repo, &["commit", "-m", &request.message]).await?;
        let commit_sha = self.head_commit(repo).await?;
        self.sink.step_progress(&format!("Committed {commit_sha}"));

        if let Some(tag) = &request.tag {
            // A previous run may have tagged locally and then failed to push
            self.git(repo, &["tag", "-f", tag]).await?;
        }

        if !request.push {
            log::info!("Push disabled, leaving {commit_sha} local");
            return Ok(CommitOutcome {
                commit_sha,
                pushed: false,
            });
        }

        let target = self.push_target(repo, &request.remote).await?;
        let refspec = format!("{}:refs/heads/{}", request.local_branch, request.remote_branch);
        self.git(repo, &["push", &target, &refspec]).await?;
        if let Some(tag) = &request.tag {
            self.git(repo, &["push", &target, &format!("refs/tags/{tag}")])
                .await?;
        }
        self.sink.step_progress(&format!(
            "Pushed {} to {}/{}",
            request.local_branch, request.remote, request.remote_branch
        ));

        Ok(CommitOutcome {
            commit_sha,
            pushed: true,
        })
    }

    /// Where to push: the remote name, or its URL with the token spliced in
    async fn push_target(&self, repo: &Path, remote: &str) -> Result<String> {
        if self.token.is_none() {
            return Ok(remote.to_string());
        }
        let url = self.git(repo, &["remote", "get-url", remote]).await?;
        let url = url.trim();
        if url.is_empty() {
            return Ok(remote.to_string());
        }
        Ok(self.authenticated(url))
    }

    /// Checked-out branch name
    pub async fn current_branch(&self, repo: &Path) -> Result<String> {
        let out = self.git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// HEAD commit sha
    pub async fn head_commit(&self, repo: &Path) -> Result<String> {
        let out = self.git(repo, &["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn git(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let command = CommandSpec::new("git", repo).args(args);
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                command: command.display(),
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(output.stdout)
    }

    async fn try_git(&self, repo: &Path, args: &[&str]) -> Result<bool> {
        let output = self
            .runner
            .run(&CommandSpec::new("git", repo).args(args))
            .await?;
        Ok(output.success())
    }
}
