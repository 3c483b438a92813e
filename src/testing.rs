//! In-memory fakes for the command runner and the release service.

use crate::error::{GitHubError, Result};
use crate::github::{
    ArtifactPayload, Asset, CreateReleaseRequest, GitObject, GitRef, Release, ReleaseApi, RepoRef,
    WorkflowArtifact, WorkflowRun,
};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

struct Script {
    args: Vec<String>,
    output: CommandOutput,
}

/// Command runner that answers from a script and records every call.
///
/// A rule matches when its arguments appear contiguously in the command's
/// arguments; the first matching rule wins. Unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Vec<Script>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for commands containing `args`
    pub fn respond(mut self, args: &[&str], stdout: &str) -> Self {
        self.scripts.push(Script {
            args: args.iter().map(|a| a.to_string()).collect(),
            output: CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        });
        self
    }

    /// Exit 1 with `stderr` for commands containing `args`
    pub fn fail_on(mut self, args: &[&str], stderr: &str) -> Self {
        self.scripts.push(Script {
            args: args.iter().map(|a| a.to_string()).collect(),
            output: CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        });
        self
    }

    /// Every command run so far
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines run so far
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let output = self
            .scripts
            .iter()
            .find(|s| {
                s.args.is_empty()
                    || command
                        .args
                        .windows(s.args.len())
                        .any(|window| window == s.args.as_slice())
            })
            .map(|s| s.output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    releases: Vec<Release>,
    branches: HashMap<(RepoRef, String), String>,
    assets: HashMap<u64, Vec<Asset>>,
    asset_bytes: HashMap<u64, Bytes>,
    runs: HashMap<u64, WorkflowRun>,
    artifacts: HashMap<u64, Vec<WorkflowArtifact>>,
    payloads: HashMap<u64, Bytes>,
    failing_uploads: HashSet<String>,
    log: Vec<String>,
}

impl FakeState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Release service held entirely in memory.
///
/// Uploading a name that is already attached answers 422, as GitHub does.
#[derive(Default)]
pub struct FakeReleaseApi {
    state: Mutex<FakeState>,
}

impl FakeReleaseApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an upstream branch
    pub fn with_branch(self, repo: &RepoRef, branch: &str, sha: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .insert((repo.clone(), branch.to_string()), sha.to_string());
        self
    }

    /// Seed a release
    pub fn with_release(self, repo: &RepoRef, tag: &str, prerelease: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.id();
            state.releases.push(Release {
                id,
                tag_name: tag.to_string(),
                target_commitish: None,
                prerelease,
                upload_url: format!("https://uploads.test/releases/{id}/assets{{?name,label}}"),
                html_url: format!("https://github.test/{repo}/releases/{tag}"),
                repo: repo.clone(),
            });
        }
        self
    }

    /// Attach an asset to the release tagged `tag`
    pub fn with_asset(self, tag: &str, name: &str, content: &[u8]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.id();
            let release_id = state
                .releases
                .iter()
                .find(|r| r.tag_name == tag)
                .map(|r| r.id)
                .unwrap();
            state.assets.entry(release_id).or_default().push(Asset {
                id,
                name: name.to_string(),
                size: content.len() as u64,
                browser_download_url: String::new(),
            });
            state.asset_bytes.insert(id, Bytes::copy_from_slice(content));
        }
        self
    }

    /// Seed a workflow run
    pub fn with_workflow_run(self, run_id: u64, status: &str, conclusion: Option<&str>) -> Self {
        self.state.lock().unwrap().runs.insert(
            run_id,
            WorkflowRun {
                id: run_id,
                status: Some(status.to_string()),
                conclusion: conclusion.map(str::to_string),
            },
        );
        self
    }

    /// Seed an artifact of `run_id`; `None` content makes its download fail
    pub fn with_artifact(self, run_id: u64, name: &str, content: Option<&[u8]>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.id();
            state.artifacts.entry(run_id).or_default().push(WorkflowArtifact {
                id,
                name: name.to_string(),
                size_in_bytes: content.map_or(0, |c| c.len() as u64),
                expired: false,
            });
            if let Some(content) = content {
                state.payloads.insert(id, Bytes::copy_from_slice(content));
            }
        }
        self
    }

    /// Make every upload of `name` fail
    pub fn fail_upload(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(name.to_string());
        self
    }

    pub fn releases(&self) -> Vec<Release> {
        self.state.lock().unwrap().releases.clone()
    }

    /// Asset names attached to the release tagged `tag`
    pub fn asset_names(&self, tag: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .releases
            .iter()
            .find(|r| r.tag_name == tag)
            .and_then(|r| state.assets.get(&r.id))
            .map(|assets| assets.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Operation log, e.g. `upload statsig-core-x86_64-static.zip`
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

fn api_error(operation: &str, status: u16, message: &str) -> crate::error::ReleaseError {
    GitHubError::Api {
        operation: operation.to_string(),
        status,
        message: message.to_string(),
    }
    .into()
}

impl ReleaseApi for FakeReleaseApi {
    async fn get_release_by_tag(&self, repo: &RepoRef, tag: &str) -> Result<Option<Release>> {
        self.record(format!("get_release {tag}"));
        let state = self.state.lock().unwrap();
        Ok(state
            .releases
            .iter()
            .find(|r| &r.repo == repo && r.tag_name == tag)
            .cloned())
    }

    async fn get_branch_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<GitRef>> {
        self.record(format!("get_branch {branch}"));
        let state = self.state.lock().unwrap();
        Ok(state
            .branches
            .get(&(repo.clone(), branch.to_string()))
            .map(|sha| GitRef {
                reference: format!("refs/heads/{branch}"),
                object: GitObject { sha: sha.clone() },
            }))
    }

    async fn create_release(&self, repo: &RepoRef, request: &CreateReleaseRequest) -> Result<Release> {
        self.record(format!("create_release {}", request.tag_name));
        let mut state = self.state.lock().unwrap();
        if state
            .releases
            .iter()
            .any(|r| &r.repo == repo && r.tag_name == request.tag_name)
        {
            return Err(api_error("create_release", 422, "already_exists"));
        }

        let id = state.id();
        let release = Release {
            id,
            tag_name: request.tag_name.clone(),
            target_commitish: request.target_commitish.clone(),
            prerelease: request.prerelease,
            upload_url: format!("https://uploads.test/releases/{id}/assets{{?name,label}}"),
            html_url: format!("https://github.test/{repo}/releases/{}", request.tag_name),
            repo: repo.clone(),
        };
        state.releases.push(release.clone());
        Ok(release)
    }

    async fn list_release_assets(&self, _repo: &RepoRef, release_id: u64) -> Result<Vec<Asset>> {
        let state = self.state.lock().unwrap();
        Ok(state.assets.get(&release_id).cloned().unwrap_or_default())
    }

    async fn delete_release_asset(&self, _repo: &RepoRef, asset_id: u64) -> Result<()> {
        self.record(format!("delete {asset_id}"));
        let mut state = self.state.lock().unwrap();
        for assets in state.assets.values_mut() {
            assets.retain(|a| a.id != asset_id);
        }
        state.asset_bytes.remove(&asset_id);
        Ok(())
    }

    async fn upload_release_asset(&self, release: &Release, name: &str, content: Bytes) -> Result<Asset> {
        self.record(format!("upload {name}"));
        let mut state = self.state.lock().unwrap();
        if state.failing_uploads.contains(name) {
            return Err(api_error("upload_release_asset", 502, "bad gateway"));
        }
        if state
            .assets
            .get(&release.id)
            .is_some_and(|assets| assets.iter().any(|a| a.name == name))
        {
            return Err(api_error("upload_release_asset", 422, "already_exists"));
        }

        let id = state.id();
        let asset = Asset {
            id,
            name: name.to_string(),
            size: content.len() as u64,
            browser_download_url: format!("https://github.test/download/{name}"),
        };
        state.assets.entry(release.id).or_default().push(asset.clone());
        state.asset_bytes.insert(id, content);
        Ok(asset)
    }

    async fn download_release_asset(&self, _repo: &RepoRef, asset_id: u64) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        state
            .asset_bytes
            .get(&asset_id)
            .cloned()
            .ok_or_else(|| api_error("download_release_asset", 404, "Not Found"))
    }

    async fn get_workflow_run(&self, _repo: &RepoRef, run_id: u64) -> Result<Option<WorkflowRun>> {
        Ok(self.state.lock().unwrap().runs.get(&run_id).cloned())
    }

    async fn list_workflow_run_artifacts(&self, _repo: &RepoRef, run_id: u64) -> Result<Vec<WorkflowArtifact>> {
        let state = self.state.lock().unwrap();
        Ok(state.artifacts.get(&run_id).cloned().unwrap_or_default())
    }

    async fn download_artifact(&self, _repo: &RepoRef, artifact_id: u64) -> Result<ArtifactPayload> {
        self.record(format!("download {artifact_id}"));
        let state = self.state.lock().unwrap();
        match state.payloads.get(&artifact_id) {
            Some(data) => Ok(ArtifactPayload {
                data: data.clone(),
                url: format!("https://blob.test/{artifact_id}.zip"),
            }),
            None => Err(api_error("download_artifact", 500, "connection reset")),
        }
    }
}
