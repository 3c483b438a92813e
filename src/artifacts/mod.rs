//! Moving binary artifacts between CI runs, the local disk and releases.
//!
//! Uploads never raise: each one reports an [`UploadOutcome`] so the caller
//! can attempt every asset before deciding whether the publish failed.
//! Downloads are all-or-nothing.

mod compress;

pub use compress::{
    BINARY_EXTENSIONS, CompressedBinary, LibCategory, archive_name, compress, compress_binaries,
    derive_target, find_binaries, unzip_into,
};

use crate::error::{GitHubError, Result, TransportError};
use crate::github::{Asset, Release, ReleaseApi, RepoRef, WorkflowArtifact};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of clearing a same-named asset before upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// An asset with the name existed and was removed
    Deleted,
    /// Nothing to remove
    NotFound,
}

/// Result of a single upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Asset is attached to the release
    Uploaded(Asset),
    /// Upload did not happen
    Failed {
        /// Asset name
        name: String,
        /// What went wrong
        error: String,
    },
}

impl UploadOutcome {
    /// Asset name either way
    pub fn name(&self) -> &str {
        match self {
            UploadOutcome::Uploaded(asset) => &asset.name,
            UploadOutcome::Failed { name, .. } => name,
        }
    }

    /// Whether the upload failed
    pub fn is_failed(&self) -> bool {
        matches!(self, UploadOutcome::Failed { .. })
    }
}

/// A workflow artifact saved to the scratch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    /// Artifact name
    pub name: String,
    /// `<scratch>/<name>.zip`
    pub path: PathBuf,
    /// Payload size
    pub size: u64,
}

/// Upload / download / delete against a release service
#[derive(Debug)]
pub struct ArtifactTransport<A> {
    api: Arc<A>,
}

impl<A> Clone for ArtifactTransport<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: ReleaseApi> ArtifactTransport<A> {
    /// Transport over `api`
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Remove the asset called `name` from `release`, if present
    pub async fn delete_existing_named(&self, release: &Release, name: &str) -> Result<DeleteOutcome> {
        delete_existing_named(self.api.as_ref(), release, name).await
    }

    /// Download the asset called `name` from `release` into `dir`.
    ///
    /// Returns `None` when the release has no such asset.
    pub async fn download_asset(&self, release: &Release, name: &str, dir: &Path) -> Result<Option<PathBuf>> {
        let assets = self.api.list_release_assets(&release.repo, release.id).await?;
        let Some(asset) = assets.into_iter().find(|a| a.name == name) else {
            return Ok(None);
        };

        let data = self.api.download_release_asset(&release.repo, asset.id).await?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&asset.name);
        tokio::fs::write(&path, &data).await?;
        log::debug!("Downloaded {} ({} bytes)", asset.name, data.len());
        Ok(Some(path))
    }

    /// Attach `path` to `release` as `display_name` (default: the file name).
    ///
    /// A same-named asset is deleted first, so repeated uploads leave exactly
    /// one asset of that name.
    pub async fn upload(&self, release: &Release, path: &Path, display_name: Option<&str>) -> UploadOutcome {
        let name = asset_name(path, display_name);
        upload_one(Arc::clone(&self.api), release.clone(), path.to_path_buf(), name).await
    }

    /// Upload every file concurrently; outcomes come back in input order
    pub async fn upload_all(&self, release: &Release, paths: &[PathBuf]) -> Vec<UploadOutcome> {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| {
                let name = asset_name(path, None);
                let task = tokio::spawn(upload_one(
                    Arc::clone(&self.api),
                    release.clone(),
                    path.clone(),
                    name.clone(),
                ));
                (name, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            outcomes.push(handle.await.unwrap_or_else(|e| UploadOutcome::Failed {
                name,
                error: format!("upload task failed: {e}"),
            }));
        }
        outcomes
    }

    /// Download the artifacts of a successful workflow run.
    ///
    /// Artifacts accepted by `predicate` are fetched concurrently. Only when
    /// every one of them arrives non-empty are they written to
    /// `<scratch>/<name>.zip`; otherwise nothing is written and the error
    /// lists what is missing.
    pub async fn download_all<P>(
        &self,
        source: &RepoRef,
        run_id: u64,
        predicate: P,
        scratch: &Path,
    ) -> Result<Vec<DownloadedArtifact>>
    where
        P: Fn(&WorkflowArtifact) -> bool,
    {
        let run = self
            .api
            .get_workflow_run(source, run_id)
            .await?
            .ok_or(GitHubError::WorkflowRunNotFound { run_id })?;
        if !run.is_successful() {
            return Err(GitHubError::WorkflowRunNotSuccessful {
                run_id,
                status: run.status.unwrap_or_else(|| "unknown".to_string()),
                conclusion: run.conclusion.unwrap_or_else(|| "none".to_string()),
            }
            .into());
        }

        let wanted: Vec<WorkflowArtifact> = self
            .api
            .list_workflow_run_artifacts(source, run_id)
            .await?
            .into_iter()
            .filter(|artifact| {
                let keep = predicate(artifact);
                log::debug!("{} artifact {}", if keep { "Found" } else { "Skipped" }, artifact.name);
                keep
            })
            .collect();

        let handles: Vec<_> = wanted
            .into_iter()
            .map(|artifact| {
                let api = Arc::clone(&self.api);
                let repo = source.clone();
                let id = artifact.id;
                let task = tokio::spawn(async move { api.download_artifact(&repo, id).await });
                (artifact.name, task)
            })
            .collect();

        let mut fetched: Vec<(String, Bytes)> = Vec::new();
        let mut missing = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(payload)) if !payload.data.is_empty() => {
                    log::debug!("Downloaded {name} from {}", payload.url);
                    fetched.push((name, payload.data));
                }
                Ok(Ok(_)) => {
                    log::warn!("Artifact {name} downloaded empty");
                    missing.push(name);
                }
                Ok(Err(e)) => {
                    log::warn!("Failed to download artifact {name}: {e}");
                    missing.push(name);
                }
                Err(e) => {
                    log::warn!("Download task for {name} failed: {e}");
                    missing.push(name);
                }
            }
        }

        if !missing.is_empty() {
            return Err(TransportError::PartialDownload { missing }.into());
        }

        tokio::fs::create_dir_all(scratch).await?;
        let mut downloaded = Vec::with_capacity(fetched.len());
        for (name, data) in fetched {
            let path = scratch.join(format!("{name}.zip"));
            tokio::fs::write(&path, &data).await?;
            downloaded.push(DownloadedArtifact {
                name,
                path,
                size: data.len() as u64,
            });
        }
        Ok(downloaded)
    }
}

fn asset_name(path: &Path, display_name: Option<&str>) -> String {
    display_name
        .map(str::to_string)
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| path.display().to_string())
}

async fn delete_existing_named<A: ReleaseApi>(
    api: &A,
    release: &Release,
    name: &str,
) -> Result<DeleteOutcome> {
    let assets = api.list_release_assets(&release.repo, release.id).await?;
    match assets.into_iter().find(|a| a.name == name) {
        Some(existing) => {
            api.delete_release_asset(&release.repo, existing.id).await?;
            Ok(DeleteOutcome::Deleted)
        }
        None => Ok(DeleteOutcome::NotFound),
    }
}

async fn upload_one<A: ReleaseApi>(api: Arc<A>, release: Release, path: PathBuf, name: String) -> UploadOutcome {
    match delete_existing_named(api.as_ref(), &release, &name).await {
        Ok(DeleteOutcome::Deleted) => log::info!("Existing asset {name} deleted"),
        Ok(DeleteOutcome::NotFound) => log::debug!("No existing asset {name}"),
        Err(e) => log::warn!("Could not clear existing asset {name}: {e}"),
    }

    let content = match tokio::fs::read(&path).await {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            return UploadOutcome::Failed {
                name,
                error: format!("failed to read {}: {e}", path.display()),
            };
        }
    };

    match api.upload_release_asset(&release, &name, content).await {
        Ok(asset) => {
            log::info!("Asset uploaded: {}", asset.browser_download_url);
            UploadOutcome::Uploaded(asset)
        }
        Err(e) => UploadOutcome::Failed {
            name,
            error: e.to_string(),
        },
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

    fn source() -> RepoRef {
        RepoRef::new("statsig-io", "private-statsig-server-core")
    }

    async fn release(api: &FakeReleaseApi) -> Release {
        api.get_release_by_tag(&repo(), "1.0.0").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_repeated_upload_leaves_one_asset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("statsig-core-x86_64-static.zip");
        std::fs::write(&file, b"zip").unwrap();

        let api = Arc::new(FakeReleaseApi::new().with_release(&repo(), "1.0.0", false));
        let transport = ArtifactTransport::new(Arc::clone(&api));
        let release = release(&api).await;

        for _ in 0..3 {
            let outcome = transport.upload(&release, &file, None).await;
            assert!(!outcome.is_failed(), "{outcome:?}");
        }
        assert_eq!(api.asset_names("1.0.0"), vec!["statsig-core-x86_64-static.zip"]);
    }

    #[tokio::test]
    async fn test_delete_reports_not_found() {
        let api = Arc::new(
            FakeReleaseApi::new()
                .with_release(&repo(), "1.0.0", false)
                .with_asset("1.0.0", "a.zip", b"x"),
        );
        let transport = ArtifactTransport::new(Arc::clone(&api));
        let release = release(&api).await;

        assert_eq!(
            transport.delete_existing_named(&release, "b.zip").await.unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            transport.delete_existing_named(&release, "a.zip").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert!(api.asset_names("1.0.0").is_empty());
    }

    #[tokio::test]
    async fn test_download_asset_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(
            FakeReleaseApi::new()
                .with_release(&repo(), "1.0.0", false)
                .with_asset("1.0.0", "statsig-core-x86_64-shared.zip", b"PK zip"),
        );
        let transport = ArtifactTransport::new(Arc::clone(&api));
        let release = release(&api).await;

        let path = transport
            .download_asset(&release, "statsig-core-x86_64-shared.zip", dir.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"PK zip");
        assert!(
            transport
                .download_asset(&release, "missing.zip", dir.path())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_upload_all_attempts_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.zip", "b.zip", "c.zip"];
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect();

        let api = Arc::new(
            FakeReleaseApi::new()
                .with_release(&repo(), "1.0.0", false)
                .fail_upload("a.zip"),
        );
        let transport = ArtifactTransport::new(Arc::clone(&api));
        let release = release(&api).await;

        let outcomes = transport.upload_all(&release, &paths).await;
        let failed: Vec<_> = outcomes.iter().filter(|o| o.is_failed()).map(|o| o.name()).collect();
        assert_eq!(failed, vec!["a.zip"]);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].name(), "b.zip");
    }

    #[tokio::test]
    async fn test_missing_file_is_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeReleaseApi::new().with_release(&repo(), "1.0.0", false));
        let transport = ArtifactTransport::new(Arc::clone(&api));
        let release = release(&api).await;

        let outcome = transport
            .upload(&release, &dir.path().join("gone.zip"), Some("renamed.zip"))
            .await;
        assert_eq!(outcome.name(), "renamed.zip");
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_download_all_filters_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(
            FakeReleaseApi::new()
                .with_workflow_run(7, "completed", Some("success"))
                .with_artifact(7, "x86_64-linux-ffi", Some(b"one"))
                .with_artifact(7, "aarch64-macos-ffi", Some(b"two"))
                .with_artifact(7, "x86_64-linux-node", None),
        );
        let transport = ArtifactTransport::new(api);

        let downloaded = transport
            .download_all(&source(), 7, |a| a.name.ends_with("ffi"), dir.path())
            .await
            .unwrap();

        assert_eq!(downloaded.len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("x86_64-linux-ffi.zip")).unwrap(),
            b"one"
        );
    }

    #[tokio::test]
    async fn test_partial_download_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let api = Arc::new(
            FakeReleaseApi::new()
                .with_workflow_run(7, "completed", Some("success"))
                .with_artifact(7, "x86_64-linux-ffi", Some(b"one"))
                .with_artifact(7, "aarch64-macos-ffi", None)
                .with_artifact(7, "windows-ffi", Some(b"")),
        );
        let transport = ArtifactTransport::new(api);

        let err = transport
            .download_all(&source(), 7, |a| a.name.ends_with("ffi"), &scratch)
            .await
            .unwrap_err();

        match err {
            ReleaseError::Transport(TransportError::PartialDownload { missing }) => {
                assert_eq!(missing, vec!["aarch64-macos-ffi", "windows-ffi"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_unsuccessful_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeReleaseApi::new().with_workflow_run(7, "in_progress", None));
        let transport = ArtifactTransport::new(api);

        let err = transport
            .download_all(&source(), 7, |_| true, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::GitHub(GitHubError::WorkflowRunNotSuccessful { .. })
        ));

        let api = Arc::new(FakeReleaseApi::new());
        let err = ArtifactTransport::new(api)
            .download_all(&source(), 8, |_| true, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::GitHub(GitHubError::WorkflowRunNotFound { .. })));
    }
}
