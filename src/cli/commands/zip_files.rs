//! Zip-files command implementation.

use super::CommandContext;
use crate::artifacts::compress_binaries;
use crate::error::Result;
use crate::events::EventSink;
use std::path::Path;

/// Execute zip-files command
pub(super) async fn execute(
    ctx: &CommandContext<'_>,
    dir: &Path,
    package: &str,
    output: Option<&Path>,
) -> Result<()> {
    let sink: &dyn EventSink = ctx.output;
    let out_dir = output.unwrap_or(dir);
    tokio::fs::create_dir_all(out_dir).await?;

    sink.step_begin(&format!("Zipping libraries under {}", dir.display()));
    let compressed = compress_binaries(package, dir, out_dir).await?;
    for item in &compressed {
        sink.step_progress(&format!(
            "{} -> {}",
            item.binary.display(),
            item.archive.display()
        ));
    }
    sink.step_end(&format!("Wrote {} archives", compressed.len()));
    Ok(())
}
