//! Attach-assets command implementation.

use super::CommandContext;
use crate::artifacts::{ArtifactTransport, UploadOutcome};
use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::github::ReleaseRegistry;
use crate::version::read_root_version;
use std::path::Path;

/// Execute attach-assets command
pub(super) async fn execute(ctx: &CommandContext<'_>, repo_name: &str, asset_path: &Path) -> Result<()> {
    let sink: &dyn EventSink = ctx.output;
    let config = ctx.pipeline_config();
    let repo = ctx.repo(&config, repo_name);
    let version = read_root_version(&ctx.root)?;
    let path = config.rooted(asset_path);
    sink.title(&format!("Attaching {} to {repo} {version}", asset_path.display()));

    let (client, _token) = ctx.github(&config).await?;
    let registry = ReleaseRegistry::new(std::sync::Arc::clone(&client));
    let transport = ArtifactTransport::new(client);

    sink.step_begin("Resolving release");
    let release = registry.require_release(&repo, &version).await?;
    sink.step_end(&format!("Release {}", release.tag_name));

    sink.step_begin(&format!("Uploading {}", path.display()));
    match transport.upload(&release, &path, None).await {
        UploadOutcome::Uploaded(asset) => {
            sink.step_end(&format!("Uploaded {}", asset.name));
            sink.conclusion(&asset.browser_download_url);
            Ok(())
        }
        UploadOutcome::Failed { name, error } => {
            sink.step_failed(&format!("{name}: {error}"));
            Err(TransportError::UploadFailed {
                failed: vec![format!("{name}: {error}")],
            }
            .into())
        }
    }
}
