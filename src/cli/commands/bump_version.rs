//! Bump-version command implementation.

use super::CommandContext;
use crate::error::Result;
use crate::version::{BumpKind, read_root_version, write_root_version};

/// Execute bump-version command
pub(super) fn execute(ctx: &CommandContext<'_>, kind: BumpKind) -> Result<()> {
    let current = read_root_version(&ctx.root)?;
    let next = current.bump(kind)?;
    write_root_version(&ctx.root, &next)?;

    log::info!("Bumped {current} -> {next}");
    let _ = ctx.output.success(&format!("Version bumped {current} → {next}"));
    let _ = ctx
        .output
        .println("Run `sdk_release sync-version` to propagate it to every package.");
    Ok(())
}
