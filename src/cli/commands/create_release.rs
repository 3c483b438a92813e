//! Create-release command implementation.
//!
//! The version branch must already exist; the release targets its head.

use super::CommandContext;
use crate::error::Result;
use crate::events::EventSink;
use crate::github::ReleaseRegistry;
use crate::version::read_root_version;

/// Execute create-release command
pub(super) async fn execute(ctx: &CommandContext<'_>, repo_name: &str) -> Result<()> {
    let sink: &dyn EventSink = ctx.output;
    let config = ctx.pipeline_config();
    let repo = ctx.repo(&config, repo_name);
    let version = read_root_version(&ctx.root)?;
    sink.title(&format!("Creating release {version} for {repo}"));

    let (client, _token) = ctx.github(&config).await?;
    let registry = ReleaseRegistry::new(client);

    sink.step_begin("Checking for an existing release");
    registry.ensure_release_absent(&repo, &version).await?;
    sink.step_end("No existing release");

    sink.step_begin(&format!("Resolving branch {}", version.to_branch()));
    let branch = registry.require_branch(&repo, &version).await?;
    sink.step_end(&format!("Branch head {}", branch.head_sha));

    sink.step_begin("Creating release");
    let release = registry
        .create_release(&repo, &version, Some(&branch.head_sha))
        .await?;
    sink.step_end(&format!("Release created: {}", release.html_url));

    sink.conclusion(&format!("Release {} created in {repo}", release.tag_name));
    Ok(())
}
