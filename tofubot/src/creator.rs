//! Opens backport pull requests through the REST API.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::github::{GitHubClient, ListPullRequests, StateFilter};
use crate::store::{BackportCreator, BackportPr, BackportRequest};

/// Opens `[Backport vX.Y] <title>` from `backport/<pr>-<version>` into the
/// version branch. The head branch is pushed by a separate git job; if it is
/// missing, GitHub rejects the pull request and the backport is marked failed.
pub struct PullRequestBackportCreator {
    client: Arc<GitHubClient>,
}

impl PullRequestBackportCreator {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

pub fn backport_title(request: &BackportRequest) -> String {
    format!("[Backport {}] {}", request.version, request.title)
}

pub fn backport_body(request: &BackportRequest) -> String {
    format!(
        "This PR backports #{} to {}.",
        request.pr_number, request.version
    )
}

#[async_trait]
impl BackportCreator for PullRequestBackportCreator {
    async fn create_backport(&self, request: &BackportRequest) -> Result<BackportPr> {
        let head = request.head_branch();
        let base = request.version.to_string();

        let existing = self
            .client
            .list_pull_requests(&ListPullRequests {
                state: Some(StateFilter::Open),
                head: Some(format!("{}:{}", self.client.repo().owner, head)),
                base: Some(base.clone()),
            })
            .await
            .context("failed to look up existing backport pull requests")?;

        if let Some(pr) = existing.first() {
            info!("Backport PR #{} from {} already open", pr.number, head);
            return Ok(BackportPr { number: pr.number });
        }

        let pr = self
            .client
            .create_pull_request(&backport_title(request), &backport_body(request), &head, &base)
            .await
            .with_context(|| format!("failed to open pull request from {} into {}", head, base))?;

        Ok(BackportPr { number: pr.number })
    }
}
