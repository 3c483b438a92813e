//! Environment-derived configuration.
//!
//! Credentials are resolved once, before any remote call, so a missing
//! variable fails the run at startup rather than halfway through a publish.

use crate::error::{ConfigError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable holding the GitHub App id
pub const APP_ID_VAR: &str = "GH_APP_ID";
/// Environment variable holding the GitHub App installation id
pub const INSTALLATION_ID_VAR: &str = "GH_APP_INSTALLATION_ID";
/// Environment variable holding the GitHub App private key (PEM)
pub const PRIVATE_KEY_VAR: &str = "GH_APP_PRIVATE_KEY";

/// Default GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Default organisation owning every downstream repository
pub const DEFAULT_OWNER: &str = "statsig-io";

/// Snapshot of environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    vars: HashMap<String, String>,
}

impl EnvConfig {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| {
            ConfigError::MissingCredential {
                name: key.to_string(),
            }
            .into()
        })
    }
}

/// GitHub App credentials for the installation-token exchange
#[derive(Clone)]
pub struct GitHubCredentials {
    /// App id
    pub app_id: String,
    /// Installation id
    pub installation_id: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
}

impl std::fmt::Debug for GitHubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl GitHubCredentials {
    /// Read all three credentials; the first absent or malformed one is reported
    pub fn from_env(env: &EnvConfig) -> Result<Self> {
        let app_id = numeric_id(env, APP_ID_VAR)?;
        let installation_id = numeric_id(env, INSTALLATION_ID_VAR)?;
        // Keys pasted into CI secrets often carry literal "\n" sequences
        let private_key = env.require(PRIVATE_KEY_VAR)?.replace("\\n", "\n");

        Ok(Self {
            app_id,
            installation_id,
            private_key,
        })
    }
}

/// GitHub App and installation ids are plain integers
fn numeric_id(env: &EnvConfig, key: &str) -> Result<String> {
    let value = env.require(key)?;
    match value.trim().parse::<u64>() {
        Ok(id) => Ok(id.to_string()),
        Err(e) => Err(ConfigError::InvalidValue {
            name: key.to_string(),
            reason: format!("'{value}' is not a numeric id ({e})"),
        }
        .into()),
    }
}

/// Settings shared by every pipeline command
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the root manifest
    pub project_root: PathBuf,
    /// Organisation that owns downstream repositories
    pub owner: String,
    /// GitHub REST endpoint
    pub api_url: String,
    /// Scratch directory for downloaded artifacts
    pub scratch_dir: PathBuf,
    /// Commit mirrored repositories but never push them
    pub skip_push: bool,
}

impl PipelineConfig {
    /// Build a config rooted at `project_root`, honouring overrides from `env`
    pub fn new(project_root: PathBuf, env: &EnvConfig) -> Self {
        Self {
            project_root,
            owner: env
                .get("GH_OWNER")
                .unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            api_url: env
                .get("GH_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            scratch_dir: std::env::temp_dir().join("statsig-server-core-publish"),
            skip_push: false,
        }
    }

    /// Resolve a project-relative path
    pub fn rooted(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_root.join(relative)
    }
}

/// Walk up from `start` to the directory whose Cargo.toml declares `[workspace]`
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let manifest = dir.join("Cargo.toml");
        if let Ok(content) = std::fs::read_to_string(&manifest)
            && let Ok(value) = content.parse::<toml::Table>()
            && value.contains_key("workspace")
        {
            return Ok(dir.to_path_buf());
        }
    }

    Err(ConfigError::RootNotFound {
        start: start.to_path_buf(),
    }
    .into())
}
