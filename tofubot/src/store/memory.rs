//! In-memory implementation of the store traits.
//!
//! Holds repository labels, per-issue labels and posted comments in
//! `RwLock`-protected collections, records every call in order, and can be
//! told to fail individual operations.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use tofubot_core::{Label, LabelSpec, Version};

use super::{BackportCreator, BackportPr, BackportRequest, CommentSink, LabelStore};
use crate::github::ClientError;

/// A recorded call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RepositoryLabels,
    IssueLabels(u64),
    AddLabel(u64, String),
    RemoveLabel(u64, String),
    CreateLabel(String),
    CreateComment(u64),
    CreateBackport(u64, Version),
}

impl Call {
    /// Whether the call changes label state.
    pub fn is_label_mutation(&self) -> bool {
        matches!(
            self,
            Call::AddLabel(..) | Call::RemoveLabel(..) | Call::CreateLabel(..)
        )
    }
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RepositoryLabels,
    IssueLabels,
    AddLabel,
    RemoveLabel,
    CreateLabel,
    CreateComment,
    CreateBackport,
}

pub const INJECTED_FAILURE: &str = "injected failure";

pub struct InMemoryRepository {
    repository_labels: RwLock<Vec<Label>>,
    issue_labels: RwLock<HashMap<u64, Vec<String>>>,
    comments: RwLock<Vec<(u64, String)>>,
    backports: RwLock<Vec<BackportRequest>>,
    calls: RwLock<Vec<Call>>,
    failures: RwLock<HashSet<Operation>>,
    next_pr_number: RwLock<u64>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            repository_labels: RwLock::new(Vec::new()),
            issue_labels: RwLock::new(HashMap::new()),
            comments: RwLock::new(Vec::new()),
            backports: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            failures: RwLock::new(HashSet::new()),
            next_pr_number: RwLock::new(1000),
        }
    }

    pub fn with_repository_label(mut self, name: &str) -> Self {
        self.repository_labels.get_mut().push(Label::named(name));
        self
    }

    pub fn with_issue_labels(mut self, issue_number: u64, names: &[&str]) -> Self {
        self.issue_labels
            .get_mut()
            .entry(issue_number)
            .or_default()
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn fail_on(mut self, operation: Operation) -> Self {
        self.failures.get_mut().insert(operation);
        self
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.read().await.clone()
    }

    pub async fn comments(&self) -> Vec<(u64, String)> {
        self.comments.read().await.clone()
    }

    /// Bodies of the comments posted on one issue.
    pub async fn comments_on(&self, issue_number: u64) -> Vec<String> {
        self.comments
            .read()
            .await
            .iter()
            .filter(|(n, _)| *n == issue_number)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub async fn labels_on(&self, issue_number: u64) -> Vec<String> {
        self.issue_labels
            .read()
            .await
            .get(&issue_number)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn repository_label_names(&self) -> Vec<String> {
        self.repository_labels
            .read()
            .await
            .iter()
            .map(|label| label.name.clone())
            .collect()
    }

    pub async fn backport_requests(&self) -> Vec<BackportRequest> {
        self.backports.read().await.clone()
    }

    async fn record(&self, call: Call) {
        self.calls.write().await.push(call);
    }

    async fn check(&self, operation: Operation) -> Result<(), ClientError> {
        if self.failures.read().await.contains(&operation) {
            return Err(ClientError::Status {
                url: format!("memory://{:?}", operation),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: INJECTED_FAILURE.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LabelStore for InMemoryRepository {
    async fn repository_labels(&self) -> Result<Vec<Label>, ClientError> {
        self.record(Call::RepositoryLabels).await;
        self.check(Operation::RepositoryLabels).await?;
        Ok(self.repository_labels.read().await.clone())
    }

    async fn issue_labels(&self, issue_number: u64) -> Result<Vec<Label>, ClientError> {
        self.record(Call::IssueLabels(issue_number)).await;
        self.check(Operation::IssueLabels).await?;
        Ok(self
            .labels_on(issue_number)
            .await
            .iter()
            .map(|name| Label::named(name))
            .collect())
    }

    async fn add_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError> {
        self.record(Call::AddLabel(issue_number, name.to_string()))
            .await;
        self.check(Operation::AddLabel).await?;

        let mut issues = self.issue_labels.write().await;
        let labels = issues.entry(issue_number).or_default();
        if !labels.iter().any(|existing| existing == name) {
            labels.push(name.to_string());
        }
        Ok(())
    }

    async fn remove_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError> {
        self.record(Call::RemoveLabel(issue_number, name.to_string()))
            .await;
        self.check(Operation::RemoveLabel).await?;

        let mut issues = self.issue_labels.write().await;
        let labels = issues.entry(issue_number).or_default();
        let Some(index) = labels.iter().position(|existing| existing == name) else {
            return Err(ClientError::Status {
                url: format!("memory://issues/{}/labels/{}", issue_number, name),
                status: StatusCode::NOT_FOUND,
                body: r#"{"message":"Label does not exist"}"#.to_string(),
            });
        };
        labels.remove(index);
        Ok(())
    }

    async fn create_label(&self, spec: &LabelSpec) -> Result<Label, ClientError> {
        self.record(Call::CreateLabel(spec.name.clone())).await;
        self.check(Operation::CreateLabel).await?;

        let mut labels = self.repository_labels.write().await;
        if labels.iter().any(|label| label.name == spec.name) {
            return Err(ClientError::Status {
                url: "memory://labels".to_string(),
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: r#"{"message":"Validation Failed","errors":[{"resource":"Label","code":"already_exists","field":"name"}]}"#.to_string(),
            });
        }

        let label = Label {
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            color: spec.color.clone(),
            default: false,
        };
        labels.push(label.clone());
        Ok(label)
    }
}

#[async_trait]
impl CommentSink for InMemoryRepository {
    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ClientError> {
        self.record(Call::CreateComment(issue_number)).await;
        self.check(Operation::CreateComment).await?;
        self.comments
            .write()
            .await
            .push((issue_number, body.to_string()));
        Ok(())
    }
}

#[async_trait]
impl BackportCreator for InMemoryRepository {
    async fn create_backport(&self, request: &BackportRequest) -> anyhow::Result<BackportPr> {
        self.record(Call::CreateBackport(
            request.pr_number,
            request.version.clone(),
        ))
        .await;
        if self.failures.read().await.contains(&Operation::CreateBackport) {
            return Err(anyhow!(
                "{} while creating {}",
                INJECTED_FAILURE,
                request.head_branch()
            ));
        }

        self.backports.write().await.push(request.clone());
        let mut next = self.next_pr_number.write().await;
        *next += 1;
        Ok(BackportPr { number: *next })
    }
}
