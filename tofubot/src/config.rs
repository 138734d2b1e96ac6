use clap::Parser;
use std::path::PathBuf;

use crate::github::{RepoId, DEFAULT_API_URL};
use crate::webhook::EventKind;

/// TofuBot: label-driven backport automation for GitHub Actions
#[derive(Parser, Clone)]
#[command(name = "tofubot", version, long_about = None)]
pub struct Config {
    /// Repository to act on, as owner/name
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: RepoId,

    /// Webhook event that triggered this run
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event_name: EventKind,

    /// Path to the JSON event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    pub event_path: PathBuf,

    /// Token used to authenticate against the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Base URL of the GitHub REST API
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repository", &self.repository)
            .field("event_name", &self.event_name)
            .field("event_path", &self.event_path)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}
