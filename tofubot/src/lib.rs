//! GitHub runtime for tofubot.
//!
//! One process handles one webhook delivery: `run` reads the event file named
//! by the configuration, routes it, and performs the resulting API calls.

pub mod backport;
pub mod config;
pub mod creator;
pub mod github;
pub mod middleware;
pub mod router;
pub mod store;
pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub use backport::{BackportMachine, BackportTarget};
pub use config::Config;
pub use creator::PullRequestBackportCreator;
pub use github::{ClientError, GitHubClient, RepoId};
pub use router::EventRouter;

/// Handle the event described by `config`.
pub async fn run(config: &Config) -> Result<()> {
    let payload = tokio::fs::read(&config.event_path)
        .await
        .with_context(|| format!("failed to read event file {}", config.event_path.display()))?;

    let client = Arc::new(
        GitHubClient::new(&config.api_url, config.token.clone(), config.repository.clone())
            .context("failed to create GitHub client")?,
    );
    let creator = Arc::new(PullRequestBackportCreator::new(client.clone()));
    let router = EventRouter::new(client.clone(), client, creator);

    info!(
        "Handling {} event for {}",
        config.event_name, config.repository
    );
    router.dispatch(config.event_name, &payload).await
}
