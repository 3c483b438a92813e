//! Sync-version command implementation.
//!
//! Writes the root version into every package that records it.

use super::CommandContext;
use crate::error::Result;
use crate::events::{EventSink, StepOutcome};
use crate::git::{CommitRequest, RepositoryMirror};
use crate::process::SystemRunner;
use crate::version::{VersionSynchronizer, default_targets, read_root_version, refresh_lockfile};

/// Execute sync-version command
pub(super) async fn execute(
    ctx: &CommandContext<'_>,
    commit_and_push: bool,
    refresh: bool,
) -> Result<()> {
    let sink: &dyn EventSink = ctx.output;
    let version = read_root_version(&ctx.root)?;
    sink.title(&format!("Syncing version {version}"));

    let changes = VersionSynchronizer::new(&ctx.root, sink).sync(&version, &default_targets())?;

    let runner = SystemRunner;
    if refresh {
        refresh_lockfile(&runner, &ctx.root, sink).await?;
    }

    if !commit_and_push {
        sink.conclusion(&format!("Updated {} files to {version}", changes.len()));
        return Ok(());
    }

    sink.step_begin("Committing version changes");
    let config = ctx.pipeline_config();
    let mirror = RepositoryMirror::new(&runner, &config.owner, sink);
    let local_branch = mirror.current_branch(&ctx.root).await?;
    let remote_branch = ctx
        .env
        .get("GITHUB_REF")
        .map(|r| r.trim_start_matches("refs/heads/").to_string())
        .unwrap_or_else(|| version.to_branch());

    let request = CommitRequest {
        repo_path: ctx.root.clone(),
        message: format!("chore: bump version to {version}"),
        remote: "origin".to_string(),
        local_branch,
        remote_branch,
        push: true,
        tag: None,
    };

    match mirror.commit_and_push(&request).await {
        Ok(outcome) => {
            sink.step_end(&format!("Committed {}", outcome.commit_sha));
            sink.conclusion(&format!("Version {version} committed and pushed"));
            Ok(())
        }
        Err(e) if e.is_benign() => {
            sink.step_end_with("No Changes to Commit", StepOutcome::Neutral);
            Ok(())
        }
        Err(e) => {
            sink.step_failed("Commit failed");
            Err(e)
        }
    }
}
