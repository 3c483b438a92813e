//! Publish command implementation.
//!
//! Binaries come either from a finished workflow run or from a local
//! directory; everything after that is the coordinator's job.

use super::CommandContext;
use crate::error::{CliError, Result};
use crate::process::SystemRunner;
use crate::publish::{PublishCoordinator, PublishTarget};
use std::path::PathBuf;

/// Arguments of the publish command
pub(super) struct PublishOptions {
    pub package: String,
    pub workflow_id: Option<u64>,
    pub repository: String,
    pub working_dir: Option<PathBuf>,
    pub skip_push: bool,
}

/// Execute publish command
pub(super) async fn execute(ctx: &CommandContext<'_>, options: PublishOptions) -> Result<()> {
    let target = PublishTarget::named(&options.package)?;

    let mut config = ctx.pipeline_config();
    config.skip_push = options.skip_push;

    let (client, token) = ctx.github(&config).await?;
    let runner = SystemRunner;
    let coordinator = PublishCoordinator::new(&config, client, &runner, ctx.output).with_token(&token);

    let working_dir = match (options.workflow_id, options.working_dir) {
        (Some(run_id), None) => {
            let source = ctx.repo(&config, &options.repository);
            coordinator
                .fetch_workflow_artifacts(&source, run_id, &target)
                .await?
        }
        (None, Some(dir)) => config.rooted(dir),
        _ => {
            return Err(CliError::InvalidArguments {
                reason: "publish needs exactly one of --workflow-id and --working-dir".to_string(),
            }
            .into());
        }
    };

    let report = coordinator.publish(&target, &working_dir).await?;
    if report.nothing_new {
        let _ = ctx
            .output
            .info(&format!("Nothing new to publish for {}", report.version));
    } else if let Some(release) = &report.release {
        log::info!(
            "Published {} with {} assets ({})",
            release.tag_name,
            report.uploaded.len(),
            report.stage
        );
    }
    Ok(())
}
