//! Webhook payload schemas and event-kind selection.
//!
//! Only the fields tofubot reads are modelled. Unknown actions deserialize to
//! an `Other` variant so new GitHub actions never break decoding.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use tofubot_core::{AuthorAssociation, IssueState, Label};

/// Which webhook a payload file contains, as named by `GITHUB_EVENT_NAME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Issues,
    IssueComment,
    PullRequest,
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unhandled event type: {0} (expected one of issues, issue_comment, pull_request, create)")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issues" => Ok(EventKind::Issues),
            "issue_comment" => Ok(EventKind::IssueComment),
            "pull_request" => Ok(EventKind::PullRequest),
            "create" => Ok(EventKind::Create),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Issues => "issues",
            EventKind::IssueComment => "issue_comment",
            EventKind::PullRequest => "pull_request",
            EventKind::Create => "create",
        })
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
}

/// Present on an issue payload when the issue is really a pull request.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PullRequestLink {
    pub url: String,
    #[serde(default)]
    pub merged_at: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: User,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub state: IssueState,
    #[serde(default)]
    pub pull_request: Option<PullRequestLink>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn is_merged(&self) -> bool {
        self.pull_request
            .as_ref()
            .is_some_and(|pr| pr.merged_at.is_some())
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|label| label.name.as_str())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub user: User,
    pub author_association: AuthorAssociation,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssueCommentEvent {
    pub action: CommentAction,
    pub issue: Issue,
    pub comment: IssueComment,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssuesAction {
    Opened,
    Edited,
    Closed,
    Reopened,
    Assigned,
    Unassigned,
    Labeled,
    Unlabeled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuesEvent {
    pub action: IssuesAction,
    pub issue: Issue,
    #[serde(default)]
    pub label: Option<Label>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Reference {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub head: Reference,
    pub base: Reference,
    /// Absent from list responses; only webhook and single-PR payloads carry it.
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merged_by: Option<User>,
}

impl PullRequest {
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|label| label.name.as_str())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Assigned,
    AutoMergeDisabled,
    AutoMergeEnabled,
    Closed,
    ConvertedToDraft,
    Edited,
    Labeled,
    Opened,
    ReadyForReview,
    Reopened,
    Synchronize,
    Unlabeled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub pull_request: PullRequest,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Branch,
    Tag,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreateEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub ref_type: RefType,
    #[serde(default)]
    pub master_branch: Option<String>,
}
