//! End-to-end publish of one package to its downstream repository.
//!
//! The order is fixed: branch check, compression, mirror push, release check
//! and create, then asset upload. Every existence check runs right before the
//! action it guards, on a single task. Nothing remote is touched until at
//! least one binary has been compressed.

use crate::artifacts::{ArtifactTransport, UploadOutcome, compress_binaries, unzip_into};
use crate::config::PipelineConfig;
use crate::error::{CliError, ReleaseError, Result, TransportError};
use crate::events::{EventSink, StepOutcome};
use crate::git::{CommitRequest, DEFAULT_LOCAL_BRANCH, RepositoryMirror};
use crate::github::{Asset, Release, ReleaseApi, ReleaseLifecycle, ReleaseRegistry, ReleaseStage, RepoRef};
use crate::process::CommandRunner;
use crate::version::{SdkVersion, read_root_version};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A package with its own downstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Asset name prefix, e.g. `statsig-core`
    pub package: String,
    /// Downstream repository name
    pub repo_name: String,
    /// Project subdirectory mirrored into the downstream repository
    pub source_subdir: PathBuf,
    /// Local branch of the mirror
    pub local_branch: String,
    /// CI artifacts feeding this package end with this suffix
    pub artifact_suffix: String,
}

impl PublishTarget {
    /// The PHP extension: `statsig-php` mirrored to `statsig-php-core`
    pub fn php() -> Self {
        Self {
            package: "statsig-core".to_string(),
            repo_name: "statsig-php-core".to_string(),
            source_subdir: PathBuf::from("statsig-php"),
            local_branch: DEFAULT_LOCAL_BRANCH.to_string(),
            artifact_suffix: "ffi".to_string(),
        }
    }

    /// Look a target up by its CLI name
    pub fn named(name: &str) -> Result<Self> {
        match name {
            "php" => Ok(Self::php()),
            other => Err(CliError::InvalidArguments {
                reason: format!("unknown package '{other}', expected one of: php"),
            }
            .into()),
        }
    }
}

/// What a publish did
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Version that was published
    pub version: SdkVersion,
    /// Release created, absent when there was nothing new
    pub release: Option<Release>,
    /// Assets attached to the release
    pub uploaded: Vec<Asset>,
    /// Mirror had no changes; no release was created
    pub nothing_new: bool,
    /// Stage the (repository, version) pair reached
    pub stage: ReleaseStage,
}

/// Drives a publish across the registry, mirror and transport
pub struct PublishCoordinator<'a, A, R> {
    config: &'a PipelineConfig,
    registry: ReleaseRegistry<A>,
    transport: ArtifactTransport<A>,
    runner: &'a R,
    sink: &'a dyn EventSink,
    token: Option<String>,
    remote_base: Option<String>,
}

impl<'a, A: ReleaseApi, R: CommandRunner> PublishCoordinator<'a, A, R> {
    /// Coordinator for the project described by `config`
    pub fn new(config: &'a PipelineConfig, api: Arc<A>, runner: &'a R, sink: &'a dyn EventSink) -> Self {
        Self {
            config,
            registry: ReleaseRegistry::new(Arc::clone(&api)),
            transport: ArtifactTransport::new(api),
            runner,
            sink,
            token: None,
            remote_base: None,
        }
    }

    /// Authenticate mirror pushes with an installation token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Push mirrors somewhere other than `https://github.com/<owner>`
    pub fn with_remote_base(mut self, base: &str) -> Self {
        self.remote_base = Some(base.to_string());
        self
    }

    /// Publish `target`, attaching the binaries found under `working_dir`.
    ///
    /// Fails before any push or upload if the version branch or release
    /// already exists, or if `working_dir` holds no native library. A clean mirror ends the run early with
    /// `nothing_new` set. Upload failures are collected and reported only
    /// after every asset was attempted.
    pub async fn publish(&self, target: &PublishTarget, working_dir: &Path) -> Result<PublishReport> {
        let repo = RepoRef::new(&self.config.owner, &target.repo_name);
        self.sink.title(&format!("Creating release for {}", target.repo_name));

        // 1. version
        self.sink.step_begin("Configuration");
        let version = read_root_version(&self.config.project_root)?;
        self.sink.step_progress(&format!("Repository: {repo}"));
        self.sink.step_progress(&format!("Working Dir: {}", working_dir.display()));
        self.sink.step_end(&format!("Version: {version}"));
        let mut lifecycle = ReleaseLifecycle::new(repo.clone(), version.clone());

        // 2. branch must not exist
        let branch = version.to_branch();
        self.sink.step_begin(&format!("Checking if {branch} branch exists"));
        self.guard(self.registry.ensure_branch_absent(&repo, &version).await)?;
        self.sink.step_end(&format!("Branch {branch} does not exist"));

        // 3. categorize and compress; an empty set stops here
        let archives = self.compress_all(&target.package, working_dir).await?;

        // 4. mirror and push
        let pushed_commit = match self.push_mirror(target, &repo, &version).await {
            Ok(commit) => commit,
            Err(e) if e.is_benign() => {
                self.sink
                    .step_end_with("No changes to commit, nothing new to release", StepOutcome::Neutral);
                self.sink.conclusion(&format!("{} is already up to date", target.repo_name));
                return Ok(PublishReport {
                    version,
                    release: None,
                    uploaded: Vec::new(),
                    nothing_new: true,
                    stage: lifecycle.stage(),
                });
            }
            Err(e) => {
                self.sink.step_failed(&format!("Failed to commit changes: {e}"));
                return Err(e);
            }
        };
        if pushed_commit.is_some() {
            lifecycle.advance(ReleaseStage::BranchPushed)?;
        }

        // 5. release must not exist, then create it
        self.sink.step_begin("Checking for existing release");
        self.guard(self.registry.ensure_release_absent(&repo, &version).await)?;
        self.sink.step_end(&format!("Release {version} does not exist"));

        self.sink.step_begin("Creating release");
        let release = self.guard(
            self.registry
                .create_release(&repo, &version, pushed_commit.as_deref())
                .await,
        )?;
        lifecycle.advance(ReleaseStage::Created)?;
        self.sink.step_end(&format!("Release created {}", release.html_url));

        // 6. upload
        self.sink.title("Uploading assets to release");
        self.sink.step_begin("Attaching assets to release");
        let outcomes = self.transport.upload_all(&release, &archives).await;

        // 7. any failure fails the publish
        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                UploadOutcome::Uploaded(asset) => {
                    self.sink
                        .step_progress_with(&format!("Uploaded {}", asset.name), StepOutcome::Success);
                    uploaded.push(asset);
                }
                UploadOutcome::Failed { name, error } => {
                    self.sink
                        .step_progress_with(&format!("Failed {name}: {error}"), StepOutcome::Failure);
                    failed.push(name);
                }
            }
        }

        if !failed.is_empty() {
            self.sink
                .step_failed(&format!("{} of {} uploads failed", failed.len(), archives.len()));
            return Err(TransportError::UploadFailed { failed }.into());
        }
        self.sink.step_end(&format!("Uploaded {} assets", uploaded.len()));
        self.sink
            .conclusion(&format!("Successfully published {} {version}", target.repo_name));

        Ok(PublishReport {
            version,
            release: Some(release),
            uploaded,
            nothing_new: false,
            stage: lifecycle.stage(),
        })
    }

    /// Download the CI artifacts for `target` from run `run_id` of `source`
    /// into the scratch directory and unpack them.
    ///
    /// The scratch directory is emptied first. Returns the directory the
    /// binaries were unpacked into.
    pub async fn fetch_workflow_artifacts(
        &self,
        source: &RepoRef,
        run_id: u64,
        target: &PublishTarget,
    ) -> Result<PathBuf> {
        let scratch = &self.config.scratch_dir;
        self.sink.step_begin(&format!("Downloading artifacts of workflow run {run_id}"));
        ensure_empty_dir(scratch).await?;

        let suffix = target.artifact_suffix.as_str();
        let downloaded = self.guard(
            self.transport
                .download_all(source, run_id, |a| a.name.ends_with(suffix), scratch)
                .await,
        )?;

        let unpacked = scratch.join("unpacked");
        for artifact in &downloaded {
            self.sink.step_progress(&format!("Downloaded artifact {}", artifact.name));
            unzip_into(&artifact.path, &unpacked.join(&artifact.name)).await?;
        }
        self.sink.step_end(&format!("Downloaded {} artifacts", downloaded.len()));
        Ok(unpacked)
    }

    async fn push_mirror(
        &self,
        target: &PublishTarget,
        repo: &RepoRef,
        version: &SdkVersion,
    ) -> Result<Option<String>> {
        self.sink.step_begin("Pushing changes to GitHub");
        let mut mirror = RepositoryMirror::new(self.runner, &repo.owner, self.sink);
        if let Some(base) = &self.remote_base {
            mirror = mirror.with_remote_base(base);
        }
        if let Some(token) = &self.token {
            mirror = mirror.with_token(token);
        }

        let path = mirror
            .ensure_mirror(&self.config.rooted(&target.source_subdir), &target.repo_name)
            .await?;

        let request = CommitRequest {
            repo_path: path,
            message: format!("chore: bump version to {version}"),
            remote: "origin".to_string(),
            local_branch: target.local_branch.clone(),
            remote_branch: version.to_branch(),
            push: !self.config.skip_push,
            tag: Some(version.tag()),
        };
        self.sink.step_progress(&format!("Remote Branch: {}", request.remote_branch));

        let outcome = mirror.commit_and_push(&request).await?;
        if outcome.pushed {
            self.sink.step_end("Changes committed and pushed");
            Ok(Some(outcome.commit_sha))
        } else {
            self.sink
                .step_end_with("Changes committed, push skipped", StepOutcome::Neutral);
            Ok(None)
        }
    }

    async fn compress_all(&self, package: &str, working_dir: &Path) -> Result<Vec<PathBuf>> {
        self.sink.step_begin("Compressing libraries");
        let compressed = self.guard(compress_binaries(package, working_dir, working_dir).await)?;
        if compressed.is_empty() {
            return self.guard(Err(TransportError::NoBinaries {
                dir: working_dir.to_path_buf(),
            }
            .into()));
        }
        for item in &compressed {
            self.sink.step_progress(&format!(
                "{} <- {}",
                item.archive.display(),
                item.binary.display()
            ));
        }
        self.sink.step_end(&format!("Compressed {} libraries", compressed.len()));
        Ok(compressed.into_iter().map(|c| c.archive).collect())
    }

    /// Report a failed guard step before passing the error up
    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| self.sink.step_failed(&e.to_string()))
    }
}

async fn ensure_empty_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ReleaseError::Io(e)),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::error::GitHubError;
    use crate::events::RecordingSink;
    use crate::testing::{FakeReleaseApi, ScriptedRunner};
    use std::io::Write;

    struct Fixture {
        dir: tempfile::TempDir,
        config: PipelineConfig,
    }

    impl Fixture {
        fn new(version: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join("Cargo.toml"),
                format!("[workspace]\nmembers = []\n\n[workspace.package]\nversion = \"{version}\"\n"),
            )
            .unwrap();
            std::fs::create_dir_all(dir.path().join("statsig-php/.git")).unwrap();

            let work = dir.path().join("work");
            std::fs::create_dir_all(&work).unwrap();
            for file in ["libstatsig_ffi-x86_64.a", "libstatsig_ffi-x86_64.so"] {
                let mut f = std::fs::File::create(work.join(file)).unwrap();
                f.write_all(b"binary").unwrap();
            }

            let mut config = PipelineConfig::new(dir.path().to_path_buf(), &EnvConfig::default());
            config.scratch_dir = dir.path().join("scratch");
            Self { dir, config }
        }

        fn work(&self) -> PathBuf {
            self.dir.path().join("work")
        }
    }

    fn dirty_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond(&["status", "--porcelain"], " M composer.json\n")
            .respond(&["rev-parse", "HEAD"], "cafe01\n")
    }

    fn php_repo() -> RepoRef {
        RepoRef::new("statsig-io", "statsig-php-core")
    }

    #[tokio::test]
    async fn test_publish_happy_path() {
        let fx = Fixture::new("3.4.0");
        let api = Arc::new(FakeReleaseApi::new());
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let report = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap();

        assert!(!report.nothing_new);
        assert_eq!(report.stage, ReleaseStage::Created);
        let release = report.release.unwrap();
        assert_eq!(release.tag_name, "3.4.0");
        assert_eq!(release.target_commitish.as_deref(), Some("cafe01"));
        assert!(!release.prerelease);

        let mut names = api.asset_names("3.4.0");
        names.sort();
        assert_eq!(
            names,
            vec!["statsig-core-x86_64-shared.zip", "statsig-core-x86_64-static.zip"]
        );
        assert!(runner.lines().contains(&"git push origin master:refs/heads/releases/3.4.0".to_string()));
        assert!(sink.failures().is_empty());
    }

    #[tokio::test]
    async fn test_second_publish_stops_at_branch_check() {
        let fx = Fixture::new("3.4.0");
        let api = Arc::new(FakeReleaseApi::new().with_branch(&php_repo(), "releases/3.4.0", "cafe01"));
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let err = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::GitHub(GitHubError::BranchExists { .. })));
        assert!(runner.calls().is_empty());
        assert!(api.releases().is_empty());
        assert!(!api.log().iter().any(|l| l.starts_with("upload")));
        assert_eq!(sink.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_release_stops_before_upload() {
        let fx = Fixture::new("3.4.0");
        let api = Arc::new(FakeReleaseApi::new().with_release(&php_repo(), "3.4.0", false));
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let err = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::GitHub(GitHubError::DuplicateRelease { .. })));
        assert!(!api.log().iter().any(|l| l.starts_with("upload")));
    }

    #[tokio::test]
    async fn test_empty_working_dir_touches_nothing_remote() {
        let fx = Fixture::new("3.4.0");
        let empty = fx.dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::write(empty.join("README.md"), b"not a library").unwrap();
        let api = Arc::new(FakeReleaseApi::new());
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let err = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &empty)
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::Transport(TransportError::NoBinaries { .. })));
        assert!(runner.calls().is_empty());
        assert!(api.releases().is_empty());
        assert!(!api.log().iter().any(|l| l.starts_with("upload")));
        assert_eq!(sink.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_mirror_is_nothing_new() {
        let fx = Fixture::new("3.4.0");
        let api = Arc::new(FakeReleaseApi::new());
        let runner = ScriptedRunner::new().respond(&["status", "--porcelain"], "");
        let sink = RecordingSink::new();

        let report = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap();

        assert!(report.nothing_new);
        assert!(report.release.is_none());
        assert_eq!(report.stage, ReleaseStage::Absent);
        assert!(api.releases().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_after_all_attempts() {
        let fx = Fixture::new("3.4.0-beta.2");
        let api = Arc::new(FakeReleaseApi::new().fail_upload("statsig-core-x86_64-static.zip"));
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let err = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap_err();

        match err {
            ReleaseError::Transport(TransportError::UploadFailed { failed }) => {
                assert_eq!(failed, vec!["statsig-core-x86_64-static.zip"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.asset_names("3.4.0-beta.2"), vec!["statsig-core-x86_64-shared.zip"]);
        assert!(api.releases()[0].prerelease);
        assert!(runner.lines().iter().any(|l| l.contains("refs/heads/betas/3.4.0-beta.2")));
    }

    #[tokio::test]
    async fn test_skip_push_still_checks_branch() {
        let mut fx = Fixture::new("3.4.0");
        fx.config.skip_push = true;
        let api = Arc::new(FakeReleaseApi::new());
        let runner = dirty_runner();
        let sink = RecordingSink::new();

        let report = PublishCoordinator::new(&fx.config, Arc::clone(&api), &runner, &sink)
            .publish(&PublishTarget::php(), &fx.work())
            .await
            .unwrap();

        assert!(api.log().iter().any(|l| l == "get_branch releases/3.4.0"));
        assert!(!runner.lines().iter().any(|l| l.starts_with("git push")));
        assert!(report.release.unwrap().target_commitish.is_none());
    }

    #[tokio::test]
    async fn test_fetch_workflow_artifacts_unpacks() {
        let fx = Fixture::new("3.4.0");

        let staging = fx.dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let lib = staging.join("libstatsig_ffi-x86_64.so");
        std::fs::write(&lib, b"so").unwrap();
        let zipped = crate::artifacts::compress(&lib, &staging.join("artifact.zip")).await.unwrap();
        let payload = std::fs::read(zipped).unwrap();

        let api = Arc::new(
            FakeReleaseApi::new()
                .with_workflow_run(99, "completed", Some("success"))
                .with_artifact(99, "x86_64-unknown-linux-gnu-ffi", Some(&payload))
                .with_artifact(99, "statsig-node", Some(b"ignored")),
        );
        let runner = ScriptedRunner::new();
        let sink = RecordingSink::new();
        let source = RepoRef::new("statsig-io", "private-statsig-server-core");

        let unpacked = PublishCoordinator::new(&fx.config, api, &runner, &sink)
            .fetch_workflow_artifacts(&source, 99, &PublishTarget::php())
            .await
            .unwrap();

        assert!(
            unpacked
                .join("x86_64-unknown-linux-gnu-ffi/libstatsig_ffi-x86_64.so")
                .is_file()
        );
        assert!(!unpacked.join("statsig-node").exists());
    }

    #[test]
    fn test_unknown_package() {
        assert!(PublishTarget::named("php").is_ok());
        assert!(PublishTarget::named("cobol").is_err());
    }
}
