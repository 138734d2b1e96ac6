//! Narrow interfaces over the remote label and comment store.
//!
//! The backport state machine and the event router only talk to these
//! traits. `GitHubClient` implements the store traits against the REST API;
//! `InMemoryRepository` implements all three for tests.

mod memory;

pub use memory::{Call, InMemoryRepository, Operation, INJECTED_FAILURE};

use async_trait::async_trait;

use tofubot_core::{Label, LabelSpec, Version};

use crate::github::ClientError;

/// Label reads and writes, scoped to one repository.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Every label defined in the repository.
    async fn repository_labels(&self) -> Result<Vec<Label>, ClientError>;

    /// Labels currently attached to an issue or pull request.
    async fn issue_labels(&self, issue_number: u64) -> Result<Vec<Label>, ClientError>;

    async fn add_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError>;

    async fn remove_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError>;

    /// Define a label at repository scope.
    async fn create_label(&self, spec: &LabelSpec) -> Result<Label, ClientError>;
}

#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ClientError>;
}

/// The pull request a backport should be created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackportRequest {
    pub pr_number: u64,
    pub title: String,
    pub version: Version,
}

impl BackportRequest {
    /// Head branch the backport commits are expected on.
    pub fn head_branch(&self) -> String {
        format!("backport/{}-{}", self.pr_number, self.version)
    }
}

/// A created (or already existing) backport pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackportPr {
    pub number: u64,
}

/// Turns a queued backport into a pull request.
#[async_trait]
pub trait BackportCreator: Send + Sync {
    async fn create_backport(&self, request: &BackportRequest) -> anyhow::Result<BackportPr>;
}
