//! Executes backport label transitions against a `LabelStore`.
//!
//! The decisions come from `tofubot_core::labels`; this module performs the
//! resulting calls in order, posts the replies, and reports partial failures.

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info, warn};

use tofubot_core::labels::{
    current_state, label_specs, pending_versions, transition, BackportEvent, LABEL_PREFIX,
};
use tofubot_core::{
    BackportState, IssueState, LabelTransition, Reply, TrackingLabel, TransitionError, Version,
};

use crate::github::ClientError;
use crate::store::{BackportCreator, BackportRequest, CommentSink, LabelStore};
use crate::webhook::{Issue, PullRequest};

/// The pull request a backport command or merge refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackportTarget {
    pub number: u64,
    pub title: String,
    /// Label names as delivered with the event.
    pub labels: Vec<String>,
    pub closed: bool,
    pub merged: bool,
}

impl From<&Issue> for BackportTarget {
    fn from(issue: &Issue) -> Self {
        Self {
            number: issue.number,
            title: issue.title.clone(),
            labels: issue.label_names().map(str::to_string).collect(),
            closed: issue.state == IssueState::Closed,
            merged: issue.is_merged(),
        }
    }
}

impl From<&PullRequest> for BackportTarget {
    fn from(pr: &PullRequest) -> Self {
        Self {
            number: pr.number,
            title: pr.title.clone(),
            labels: pr.label_names().map(str::to_string).collect(),
            closed: pr.state == IssueState::Closed,
            merged: pr.merged,
        }
    }
}

/// A label transition that stopped halfway.
///
/// The client error is part of the message and is not exposed as a source.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to add label {label} ({error})")]
    Add { label: String, error: ClientError },
    /// `kept` is the label that was added before the removal failed.
    #[error("failed to remove label {label} ({error})")]
    Remove {
        label: String,
        kept: Option<String>,
        error: ClientError,
    },
}

impl ApplyError {
    pub fn client_error(&self) -> &ClientError {
        match self {
            ApplyError::Add { error, .. } | ApplyError::Remove { error, .. } => error,
        }
    }

    /// The notice to post when both the new and the old state label are left
    /// on the pull request.
    pub fn rollback_reply(&self, version: &Version) -> Option<Reply> {
        match self {
            ApplyError::Remove {
                label,
                kept: Some(kept),
                error,
            } => Some(Reply::LabelRollback {
                version: version.clone(),
                kept: kept.clone(),
                stale: label.clone(),
                error: error.to_string(),
            }),
            _ => None,
        }
    }
}

pub struct BackportMachine<'a> {
    labels: &'a dyn LabelStore,
    comments: &'a dyn CommentSink,
    creator: &'a dyn BackportCreator,
}

impl<'a> BackportMachine<'a> {
    pub fn new(
        labels: &'a dyn LabelStore,
        comments: &'a dyn CommentSink,
        creator: &'a dyn BackportCreator,
    ) -> Self {
        Self {
            labels,
            comments,
            creator,
        }
    }

    /// Handle a validated `backport <version>` command.
    pub async fn request(
        &self,
        target: &BackportTarget,
        requester: &str,
        version: &Version,
    ) -> Result<()> {
        let label = BackportState::Requested.label_name(version);

        let repository_labels = match self.labels.repository_labels().await {
            Ok(labels) => labels,
            Err(e) => {
                self.reply_best_effort(
                    target.number,
                    Reply::LabelLookupFailed {
                        requester: requester.to_string(),
                        error: e.to_string(),
                    },
                )
                .await;
                return Err(e).context("failed to fetch repository labels");
            }
        };

        if !repository_labels.iter().any(|l| l.name == label) {
            info!("Label {} does not exist, rejecting backport request", label);
            return self
                .reply(
                    target.number,
                    Reply::LabelMissing {
                        requester: requester.to_string(),
                        label,
                    },
                )
                .await;
        }

        // State comes from the labels delivered with the event. From `Failed`
        // this plans a retry: add `backport/<v>`, then drop the `/failed` label.
        let current = current_state(target.labels.iter().map(String::as_str), version);
        let planned = match transition(version, current, BackportEvent::Requested) {
            Ok(planned) => planned,
            Err(TransitionError::AlreadyOpen(_)) => {
                info!("Backport of #{} to {} is already open", target.number, version);
                return self
                    .reply(
                        target.number,
                        Reply::BackportAlreadyOpen {
                            requester: requester.to_string(),
                            version: version.clone(),
                        },
                    )
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.apply(target.number, &planned).await {
            let reply = e.rollback_reply(version).unwrap_or_else(|| Reply::LabelAddFailed {
                requester: requester.to_string(),
                error: e.client_error().to_string(),
            });
            self.reply_best_effort(target.number, reply).await;
            return Err(e).context("failed to add labels");
        }

        let reply = if target.closed {
            Reply::BackportScheduled {
                requester: requester.to_string(),
                version: version.clone(),
            }
        } else {
            Reply::BackportQueued {
                requester: requester.to_string(),
                version: version.clone(),
            }
        };
        self.reply(target.number, reply)
            .await
            .context("failed to post success comment")?;

        // No merge event will come for a PR that is already merged.
        if target.merged {
            info!(
                "#{} is already merged, creating backport to {} now",
                target.number, version
            );
            self.resolve(target, version).await?;
        }

        Ok(())
    }

    /// Handle a validated `cancel-backport <version>` command.
    pub async fn cancel(
        &self,
        target: &BackportTarget,
        requester: &str,
        version: &Version,
    ) -> Result<()> {
        let current = current_state(target.labels.iter().map(String::as_str), version);
        let planned = match transition(version, current, BackportEvent::Cancelled) {
            Ok(planned) => planned,
            // Only a pending request can be cancelled; open and failed backports stay.
            Err(_) => {
                info!(
                    "No pending backport of #{} to {}, nothing to cancel",
                    target.number, version
                );
                return self
                    .reply(
                        target.number,
                        Reply::NothingToCancel {
                            requester: requester.to_string(),
                            version: version.clone(),
                        },
                    )
                    .await;
            }
        };

        if let Err(e) = self.apply(target.number, &planned).await {
            self.reply_best_effort(
                target.number,
                Reply::CancelFailed {
                    requester: requester.to_string(),
                    error: e.client_error().to_string(),
                },
            )
            .await;
            return Err(e).context("failed to remove backport label");
        }

        info!("Cancelled backport of #{} to {}", target.number, version);
        self.reply(
            target.number,
            Reply::BackportCancelled {
                requester: requester.to_string(),
                version: version.clone(),
            },
        )
        .await
        .context("failed to post cancellation comment")
    }

    /// Create backports for every outstanding request on a merged pull request.
    ///
    /// Stops at the first failure.
    pub async fn resolve_merged(&self, target: &BackportTarget) -> Result<()> {
        for name in &target.labels {
            if name.starts_with(LABEL_PREFIX) && TrackingLabel::parse(name).is_none() {
                warn!("Ignoring label {} on #{}: not a valid backport label", name, target.number);
            }
        }

        let names = || target.labels.iter().map(String::as_str);
        let versions = pending_versions(names());
        if versions.is_empty() {
            info!("#{} merged with no pending backports", target.number);
            return Ok(());
        }

        for version in &versions {
            // A redelivered merge event finds `/open` or `/failed` already set.
            if current_state(names(), version) != Some(BackportState::Requested) {
                warn!(
                    "Skipping backport of #{} to {}: a later state label is already present",
                    target.number, version
                );
                continue;
            }
            self.resolve(target, version)
                .await
                .with_context(|| format!("failed to backport #{} to {}", target.number, version))?;
        }

        Ok(())
    }

    /// Create the backport for one requested version and record the outcome.
    pub async fn resolve(&self, target: &BackportTarget, version: &Version) -> Result<()> {
        let request = BackportRequest {
            pr_number: target.number,
            title: target.title.clone(),
            version: version.clone(),
        };

        match self.creator.create_backport(&request).await {
            Ok(pr) => {
                info!("Backport of #{} to {} is #{}", target.number, version, pr.number);
                let planned = transition(version, Some(BackportState::Requested), BackportEvent::Opened)?;

                // The PR exists whatever happens to the labels, so its number
                // must reach the thread either way.
                if let Err(e) = self.apply(target.number, &planned).await {
                    let add = match &e {
                        ApplyError::Add { label, .. } => Some(label.clone()),
                        ApplyError::Remove { .. } => None,
                    };
                    self.reply_best_effort(
                        target.number,
                        Reply::BackportOpenedLabelsStale {
                            version: version.clone(),
                            pr_number: pr.number,
                            add,
                            remove: planned.label_to_remove().unwrap_or_default(),
                            error: e.client_error().to_string(),
                        },
                    )
                    .await;
                    return Err(e).context("failed to record backport state");
                }

                self.reply(
                    target.number,
                    Reply::BackportOpened {
                        version: version.clone(),
                        pr_number: pr.number,
                    },
                )
                .await
                .context("failed to post backport comment")
            }
            Err(e) => {
                error!("Backport of #{} to {} failed: {:#}", target.number, version, e);
                let planned =
                    transition(version, Some(BackportState::Requested), BackportEvent::CreationFailed)?;
                // The creation error is what gets returned; a label error is only logged.
                if let Err(label_error) = self.finish(target.number, version, &planned).await {
                    warn!("{:#}", label_error);
                }
                self.reply_best_effort(
                    target.number,
                    Reply::BackportFailed {
                        version: version.clone(),
                        error: format!("{:#}", e),
                    },
                )
                .await;
                Err(e.context(format!("failed to create backport to {}", version)))
            }
        }
    }

    /// Seed the tracking labels for a newly created version branch.
    ///
    /// Returns the version, or `None` when the branch is not a version branch.
    /// Labels that already exist are skipped.
    pub async fn announce_branch(&self, git_ref: &str) -> Result<Option<Version>> {
        let Some(version) = Version::from_branch_ref(git_ref) else {
            info!("Branch {} is not a version branch, ignoring", git_ref);
            return Ok(None);
        };

        for spec in label_specs(&version) {
            match self.labels.create_label(&spec).await {
                Ok(_) => info!("Created label {}", spec.name),
                Err(e) if e.is_already_exists() => {
                    info!("Label {} already exists, skipping", spec.name)
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create label {}", spec.name))
                }
            }
        }

        Ok(Some(version))
    }

    /// Add the new state label, then remove the old one.
    async fn apply(&self, issue_number: u64, planned: &LabelTransition) -> Result<(), ApplyError> {
        if planned.is_noop() {
            return Ok(());
        }

        let added = planned.label_to_add();
        if let Some(label) = &added {
            self.labels
                .add_label(issue_number, label)
                .await
                .map_err(|error| ApplyError::Add {
                    label: label.clone(),
                    error,
                })?;
            info!("Added label {} to #{}", label, issue_number);
        }

        if let Some(label) = planned.label_to_remove() {
            self.labels
                .remove_label(issue_number, &label)
                .await
                .map_err(|error| ApplyError::Remove {
                    label: label.clone(),
                    kept: added.clone(),
                    error,
                })?;
            info!("Removed label {} from #{}", label, issue_number);
        }

        Ok(())
    }

    /// Apply the `Failed` transition after a creation error, posting the
    /// rollback notice if it stops between the add and the remove.
    async fn finish(
        &self,
        issue_number: u64,
        version: &Version,
        planned: &LabelTransition,
    ) -> Result<()> {
        let Err(e) = self.apply(issue_number, planned).await else {
            return Ok(());
        };
        if let Some(reply) = e.rollback_reply(version) {
            self.reply_best_effort(issue_number, reply).await;
        }
        Err(e).context("failed to record backport state")
    }

    async fn reply(&self, issue_number: u64, reply: Reply) -> Result<()> {
        self.comments
            .create_comment(issue_number, &reply.render())
            .await
            .with_context(|| format!("failed to post comment on #{}", issue_number))
    }

    /// Post a reply on an error path. The original error wins, so a failure
    /// here is only logged.
    async fn reply_best_effort(&self, issue_number: u64, reply: Reply) {
        if let Err(e) = self.reply(issue_number, reply).await {
            warn!("{:#}", e);
        }
    }
}
