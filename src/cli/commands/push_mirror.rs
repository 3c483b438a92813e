//! Push-mirror command implementation.

use super::CommandContext;
use crate::error::Result;
use crate::events::{EventSink, StepOutcome};
use crate::git::{CommitRequest, DEFAULT_LOCAL_BRANCH, RepositoryMirror};
use crate::github::ReleaseRegistry;
use crate::process::SystemRunner;
use crate::version::read_root_version;
use std::path::Path;

/// Execute push-mirror command
pub(super) async fn execute(
    ctx: &CommandContext<'_>,
    repo_name: &str,
    subdir: &Path,
    skip_push: bool,
) -> Result<()> {
    let sink: &dyn EventSink = ctx.output;
    let config = ctx.pipeline_config();
    let repo = ctx.repo(&config, repo_name);
    let version = read_root_version(&ctx.root)?;
    let branch = version.to_branch();
    sink.title(&format!("Mirroring {} to {repo}", subdir.display()));

    let (client, token) = ctx.github(&config).await?;
    let registry = ReleaseRegistry::new(client);

    sink.step_begin(&format!("Checking if {branch} branch exists"));
    registry.ensure_branch_absent(&repo, &version).await?;
    sink.step_end("Branch does not exist");

    let runner = SystemRunner;
    let mirror = RepositoryMirror::new(&runner, &config.owner, sink).with_token(&token);
    let path = mirror
        .ensure_mirror(&config.rooted(subdir), repo_name)
        .await?;

    let request = CommitRequest {
        repo_path: path,
        message: format!("chore: bump version to {version}"),
        remote: "origin".to_string(),
        local_branch: DEFAULT_LOCAL_BRANCH.to_string(),
        remote_branch: branch.clone(),
        push: !skip_push,
        tag: Some(version.tag()),
    };

    match mirror.commit_and_push(&request).await {
        Ok(outcome) if outcome.pushed => {
            sink.conclusion(&format!("Pushed {} to {repo} {branch}", outcome.commit_sha));
            Ok(())
        }
        Ok(outcome) => {
            sink.conclusion(&format!("Committed {} locally, push skipped", outcome.commit_sha));
            Ok(())
        }
        Err(e) if e.is_benign() => {
            sink.step_end_with("No Changes to Commit", StepOutcome::Neutral);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
