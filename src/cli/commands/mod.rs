//! Command execution: one module per subcommand, one exit-code boundary.
//!
//! Commands return errors instead of exiting; [`execute_command`] turns the
//! outcome into the process exit code.

mod attach_assets;
mod bump_version;
mod create_release;
mod publish;
mod push_mirror;
mod sync_version;
mod zip_files;

use crate::cli::{Args, Command, OutputManager};
use crate::config::{EnvConfig, GitHubCredentials, PipelineConfig, find_project_root};
use crate::error::{ConfigError, Result};
use crate::github::{GitHubClient, RepoRef};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs from its surroundings
pub(crate) struct CommandContext<'a> {
    /// Project root holding the canonical version
    pub root: PathBuf,
    /// Environment snapshot
    pub env: EnvConfig,
    /// Terminal output, also the event sink
    pub output: &'a OutputManager,
}

impl CommandContext<'_> {
    /// Pipeline settings for this project
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.root.clone(), &self.env)
    }

    /// Repository `name` under the configured owner
    pub fn repo(&self, config: &PipelineConfig, name: &str) -> RepoRef {
        RepoRef::new(&config.owner, name)
    }

    /// Authenticated client plus the installation token for git pushes
    pub async fn github(&self, config: &PipelineConfig) -> Result<(Arc<GitHubClient>, String)> {
        let credentials = GitHubCredentials::from_env(&self.env)?;
        let (client, token) = GitHubClient::connect(config, &credentials).await?;
        Ok((Arc::new(client), token))
    }
}

/// Execute the parsed command and return the process exit code
pub async fn execute_command(args: Args) -> Result<i32> {
    let output = OutputManager::new(args.verbose, args.quiet);

    if let Err(validation_error) = args.validate() {
        output.error(&format!("Invalid arguments: {validation_error}"));
        return Ok(1);
    }

    let name = args.command.name();
    match run(args, &output).await {
        Ok(()) => Ok(0),
        Err(e) => {
            output.error(&format!("Command '{name}' failed: {e}"));

            if output.is_verbose() {
                let suggestions = e.recovery_suggestions();
                if !suggestions.is_empty() {
                    let _ = output.println("\n💡 Recovery suggestions:");
                    for suggestion in suggestions {
                        let _ = output.println(&format!("  • {suggestion}"));
                    }
                }
            }

            Ok(1)
        }
    }
}

async fn run(args: Args, output: &OutputManager) -> Result<()> {
    let env = EnvConfig::from_process();

    // Credentials are checked before anything touches disk or network
    if args.command.needs_credentials() {
        GitHubCredentials::from_env(&env)?;
    }

    let root = resolve_root(args.root)?;
    log::debug!("Project root: {}", root.display());

    let ctx = CommandContext { root, env, output };
    dispatch(&ctx, args.command).await
}

async fn dispatch(ctx: &CommandContext<'_>, command: Command) -> Result<()> {
    match command {
        Command::SyncVersion {
            commit_and_push,
            no_lockfile_refresh,
        } => sync_version::execute(ctx, commit_and_push, !no_lockfile_refresh).await,
        Command::BumpVersion { kind } => bump_version::execute(ctx, kind),
        Command::CreateRelease { repo } => create_release::execute(ctx, &repo).await,
        Command::PushMirror {
            repo,
            subdir,
            skip_push,
        } => push_mirror::execute(ctx, &repo, &subdir, skip_push).await,
        Command::AttachAssets { repo, asset_path } => {
            attach_assets::execute(ctx, &repo, &asset_path).await
        }
        Command::ZipFiles {
            dir,
            package,
            output,
        } => zip_files::execute(ctx, &dir, &package, output.as_deref()).await,
        Command::Publish {
            package,
            workflow_id,
            repository,
            working_dir,
            skip_push,
        } => {
            let options = publish::PublishOptions {
                package,
                workflow_id,
                repository,
                working_dir,
                skip_push,
            };
            publish::execute(ctx, options).await
        }
    }
}

fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(root) if root.join("Cargo.toml").is_file() => Ok(root),
        Some(root) => Err(ConfigError::RootNotFound { start: root }.into()),
        None => find_project_root(&std::env::current_dir()?),
    }
}
