//! Event dispatch: one webhook payload in, label and comment changes out.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use tofubot_core::{authorize, CommandName, CommandParser, ParseResult, Reply, Verdict, Version};

use crate::backport::{BackportMachine, BackportTarget};
use crate::store::{BackportCreator, CommentSink, LabelStore};
use crate::webhook::{
    CommentAction, CreateEvent, EventKind, IssueCommentEvent, IssuesEvent, PullRequestAction,
    PullRequestEvent, RefType,
};

pub struct EventRouter {
    parser: CommandParser,
    labels: Arc<dyn LabelStore>,
    comments: Arc<dyn CommentSink>,
    creator: Arc<dyn BackportCreator>,
}

fn decode<T: DeserializeOwned>(kind: EventKind, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .with_context(|| format!("failed to decode {} event payload", kind))
}

impl EventRouter {
    pub fn new(
        labels: Arc<dyn LabelStore>,
        comments: Arc<dyn CommentSink>,
        creator: Arc<dyn BackportCreator>,
    ) -> Self {
        Self {
            parser: CommandParser::new(),
            labels,
            comments,
            creator,
        }
    }

    fn machine(&self) -> BackportMachine<'_> {
        BackportMachine::new(
            self.labels.as_ref(),
            self.comments.as_ref(),
            self.creator.as_ref(),
        )
    }

    /// Decode `payload` as a `kind` event and handle it.
    pub async fn dispatch(&self, kind: EventKind, payload: &[u8]) -> Result<()> {
        info!("Processing {} event", kind);
        match kind {
            EventKind::IssueComment => self.on_issue_comment(&decode(kind, payload)?).await,
            EventKind::Issues => self.on_issues(&decode(kind, payload)?).await,
            EventKind::PullRequest => self.on_pull_request(&decode(kind, payload)?).await,
            EventKind::Create => self.on_create(&decode(kind, payload)?).await,
        }
    }

    pub async fn on_issue_comment(&self, event: &IssueCommentEvent) -> Result<()> {
        // Edits and deletions never rerun a command; only a fresh comment does.
        if event.action != CommentAction::Created {
            info!("Ignoring comment event: {:?}", event.action);
            return Ok(());
        }

        let command = match self.parser.parse(&event.comment.body) {
            ParseResult::NotACommand => return Ok(()),
            // No reply: a typo should not spam the thread.
            ParseResult::Unrecognized { attempted } => {
                info!(
                    "Ignoring unrecognized command '{}' from {} on #{}",
                    attempted, event.comment.user.login, event.issue.number
                );
                return Ok(());
            }
            ParseResult::Command(command) => command,
        };

        let issue_number = event.issue.number;
        let requester = event.comment.user.login.as_str();
        info!("Found command from {} on #{}: {}", requester, issue_number, command);

        // Help is open to everyone, on issues and PRs alike.
        if command.name == CommandName::Help {
            return self
                .reply(
                    issue_number,
                    Reply::Help {
                        requester: requester.to_string(),
                    },
                )
                .await;
        }

        // Checks run in a fixed order and stop at the first failure:
        // arity, permission, pull request, version.
        if !command.has_expected_arity() {
            return self
                .reply(
                    issue_number,
                    Reply::WrongArgumentCount {
                        requester: requester.to_string(),
                        command: command.name,
                    },
                )
                .await;
        }

        if let Verdict::Denied { reply } =
            authorize(event.comment.author_association, command.name, requester)
        {
            info!(
                "Denied {} for {} ({})",
                command.name, requester, event.comment.author_association
            );
            return self.reply(issue_number, reply).await;
        }

        if !event.issue.is_pull_request() {
            return self
                .reply(
                    issue_number,
                    Reply::NotAPullRequest {
                        requester: requester.to_string(),
                        command: command.name,
                    },
                )
                .await;
        }

        let Some(version) = command.first_arg().and_then(|arg| Version::parse(arg).ok()) else {
            return self
                .reply(
                    issue_number,
                    Reply::InvalidVersion {
                        requester: requester.to_string(),
                        command: command.name,
                    },
                )
                .await;
        };

        let target = BackportTarget::from(&event.issue);
        match command.name {
            CommandName::Backport => self.machine().request(&target, requester, &version).await,
            CommandName::CancelBackport => {
                self.machine().cancel(&target, requester, &version).await
            }
            CommandName::Help => Ok(()), // answered above
        }
    }

    pub async fn on_issues(&self, event: &IssuesEvent) -> Result<()> {
        info!(
            "Ignoring issues event on #{}: {:?}",
            event.issue.number, event.action
        );
        Ok(())
    }

    pub async fn on_pull_request(&self, event: &PullRequestEvent) -> Result<()> {
        if event.action != PullRequestAction::Closed {
            info!("Ignoring pull request event: {:?}", event.action);
            return Ok(());
        }
        // Backports of a PR closed without merging stay pending in case it is reopened.
        if !event.pull_request.merged {
            info!("#{} was closed without merging", event.number);
            return Ok(());
        }

        info!("#{} merged, checking for pending backports", event.number);
        self.machine()
            .resolve_merged(&BackportTarget::from(&event.pull_request))
            .await
    }

    pub async fn on_create(&self, event: &CreateEvent) -> Result<()> {
        if event.ref_type != RefType::Branch {
            info!("Ignoring {:?} creation: {}", event.ref_type, event.ref_name);
            return Ok(());
        }

        // Non-version branches are skipped inside announce_branch.
        if let Some(version) = self.machine().announce_branch(&event.ref_name).await? {
            info!("Backport labels for {} are in place", version);
        }
        Ok(())
    }

    async fn reply(&self, issue_number: u64, reply: Reply) -> Result<()> {
        self.comments
            .create_comment(issue_number, &reply.render())
            .await
            .with_context(|| format!("failed to post comment on #{}", issue_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Call, InMemoryRepository};
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use tofubot_core::AuthorAssociation;

    const PR: u64 = 42;

    fn router(repo: &Arc<InMemoryRepository>) -> EventRouter {
        EventRouter::new(repo.clone(), repo.clone(), repo.clone())
    }

    fn comment_event(body: &str, association: &str, pull_request: Option<Value>) -> Value {
        let mut issue = json!({
            "number": PR,
            "title": "Fix the state lock",
            "user": { "login": "author" },
            "labels": [],
            "state": "open",
        });
        if let Some(pr) = pull_request {
            issue["pull_request"] = pr;
        }
        json!({
            "action": "created",
            "issue": issue,
            "comment": {
                "id": 1,
                "body": body,
                "user": { "login": "maintainer" },
                "author_association": association,
            },
        })
    }

    fn open_pr() -> Option<Value> {
        Some(json!({ "url": "https://api.github.com/repos/o/r/pulls/42", "merged_at": null }))
    }

    async fn send(router: &EventRouter, kind: EventKind, event: &Value) -> Result<()> {
        router
            .dispatch(kind, &serde_json::to_vec(event).unwrap())
            .await
    }

    #[tokio::test]
    async fn test_help_is_posted_for_anyone() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = comment_event("/tofubot", "NONE", None);

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        let comments = repo.comments_on(PR).await;
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("👋 Hi @maintainer! I'm 🤖 TofuBot."));
        assert!(comments[0].contains("### `/tofubot backport vX.Y`"));
    }

    #[tokio::test]
    async fn test_backport_on_open_pr_attaches_label() {
        let repo = Arc::new(InMemoryRepository::new().with_repository_label("backport/v1.2"));
        let event = comment_event("/tofubot backport v1.2", "OWNER", open_pr());

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert_eq!(repo.labels_on(PR).await, vec!["backport/v1.2"]);
        assert_eq!(
            repo.comments_on(PR).await,
            vec!["✅ Hey @maintainer, all right, I've queued up a backport to version v1.2 when the PR merges."]
        );
    }

    #[tokio::test]
    async fn test_backport_on_closed_pr_announces_shortly() {
        let repo = Arc::new(InMemoryRepository::new().with_repository_label("backport/v1.2"));
        let mut event = comment_event("/tofubot backport v1.2", "COLLABORATOR", open_pr());
        event["issue"]["state"] = json!("closed");

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert_eq!(
            repo.comments_on(PR).await,
            vec!["✅ Hey @maintainer, all right, I'll create a PR to version v1.2 shortly."]
        );
    }

    #[tokio::test]
    async fn test_wrong_argument_count_is_checked_first() {
        for body in ["/tofubot backport", "/tofubot backport v1.2 v1.3"] {
            let repo = Arc::new(InMemoryRepository::new());
            // Not a PR and not privileged: the arity reply still wins.
            let event = comment_event(body, "NONE", None);

            send(&router(&repo), EventKind::IssueComment, &event)
                .await
                .unwrap();

            let comments = repo.comments_on(PR).await;
            assert_eq!(comments.len(), 1);
            assert!(comments[0].contains("doesn't have the right amount of parameters"));
            assert!(comments[0].contains("Try this: `/tofubot backport vX.Y`"));
            assert!(!repo.calls().await.iter().any(Call::is_label_mutation));
        }
    }

    #[tokio::test]
    async fn test_permission_checked_before_pull_request() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = comment_event("/tofubot cancel-backport v1.2", "CONTRIBUTOR", None);

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        let comments = repo.comments_on(PR).await;
        assert!(comments[0].contains("you don't seem to have permissions to cancel a backport"));
    }

    #[tokio::test]
    async fn test_backport_on_plain_issue_is_rejected() {
        let repo = Arc::new(InMemoryRepository::new().with_repository_label("backport/v1.2"));
        let event = comment_event("/tofubot backport v1.2", "OWNER", None);

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert!(repo.comments_on(PR).await[0].contains("to backport an issue?"));
        assert!(repo.labels_on(PR).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_version_is_rejected() {
        let repo = Arc::new(InMemoryRepository::new().with_repository_label("backport/v1.2"));
        let event = comment_event("/tofubot backport 1.2", "OWNER", open_pr());

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert!(repo.comments_on(PR).await[0].contains("version branch number mixed up"));
        assert_eq!(repo.calls().await, vec![Call::CreateComment(PR)]);
    }

    #[tokio::test]
    async fn test_missing_label_is_reported_without_label_call() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = comment_event("/tofubot backport v1.2", "OWNER", open_pr());

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert!(repo.comments_on(PR).await[0].contains("doesn't exist"));
        assert!(!repo.calls().await.iter().any(Call::is_label_mutation));
    }

    #[tokio::test]
    async fn test_cancel_backport_removes_label() {
        let repo = Arc::new(InMemoryRepository::new().with_issue_labels(PR, &["backport/v1.2"]));
        let mut event = comment_event("/tofubot cancel-backport v1.2", "OWNER", open_pr());
        event["issue"]["labels"] = json!([{ "name": "backport/v1.2" }]);

        send(&router(&repo), EventKind::IssueComment, &event)
            .await
            .unwrap();

        assert!(repo.labels_on(PR).await.is_empty());
        assert!(repo.comments_on(PR).await[0].contains("cancelled the backport to version v1.2"));
    }

    #[tokio::test]
    async fn test_edited_comments_and_unknown_commands_are_ignored() {
        let repo = Arc::new(InMemoryRepository::new());

        let mut edited = comment_event("/tofubot backport v1.2", "OWNER", open_pr());
        edited["action"] = json!("edited");
        send(&router(&repo), EventKind::IssueComment, &edited)
            .await
            .unwrap();

        let unknown = comment_event("/tofubot frobnicate v1.2", "OWNER", open_pr());
        send(&router(&repo), EventKind::IssueComment, &unknown)
            .await
            .unwrap();

        assert!(repo.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_merged_pull_request_resolves_pending_backports() {
        let repo = Arc::new(InMemoryRepository::new().with_issue_labels(
            PR,
            &["backport/v1.1", "backport/v1.2/open", "backport/v1.3/failed"],
        ));
        let event = json!({
            "action": "closed",
            "number": PR,
            "pull_request": {
                "number": PR,
                "title": "Fix the state lock",
                "state": "closed",
                "merged": true,
                "labels": [
                    { "name": "backport/v1.1" },
                    { "name": "backport/v1.2/open" },
                    { "name": "backport/v1.3/failed" },
                ],
                "head": { "label": "someone:fix", "ref": "fix" },
                "base": { "label": "opentofu:main", "ref": "main" },
            },
        });

        send(&router(&repo), EventKind::PullRequest, &event)
            .await
            .unwrap();

        let requests = repo.backport_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].version.as_str(), "v1.1");
        assert_eq!(requests[0].title, "Fix the state lock");
    }

    #[tokio::test]
    async fn test_closed_unmerged_pull_request_is_ignored() {
        let repo = Arc::new(InMemoryRepository::new().with_issue_labels(PR, &["backport/v1.1"]));
        let event = json!({
            "action": "closed",
            "number": PR,
            "pull_request": {
                "number": PR,
                "state": "closed",
                "merged": false,
                "labels": [{ "name": "backport/v1.1" }],
                "head": { "ref": "fix" },
                "base": { "ref": "main" },
            },
        });

        send(&router(&repo), EventKind::PullRequest, &event)
            .await
            .unwrap();

        assert!(repo.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_branch_creation_seeds_labels() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = json!({ "ref": "v1.9", "ref_type": "branch", "master_branch": "main" });

        send(&router(&repo), EventKind::Create, &event)
            .await
            .unwrap();

        assert_eq!(
            repo.repository_label_names().await,
            vec!["backport/v1.9", "backport/v1.9/open", "backport/v1.9/failed"]
        );
    }

    #[tokio::test]
    async fn test_tag_creation_is_ignored() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = json!({ "ref": "v1.9", "ref_type": "tag" });

        send(&router(&repo), EventKind::Create, &event)
            .await
            .unwrap();

        assert!(repo.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_issues_events_are_noops() {
        let repo = Arc::new(InMemoryRepository::new());
        let event = json!({
            "action": "labeled",
            "issue": { "number": 3, "user": { "login": "a" }, "state": "open" },
            "label": { "name": "bug" },
        });

        send(&router(&repo), EventKind::Issues, &event)
            .await
            .unwrap();

        assert!(repo.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let err = router(&repo)
            .dispatch(EventKind::PullRequest, br#"{"action": "closed"}"#)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to decode pull_request event payload"));
    }

    proptest! {
        #[test]
        fn test_non_command_comments_make_no_calls(body in "\\PC*") {
            prop_assume!(body.split_whitespace().next() != Some("/tofubot"));

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let repo = Arc::new(InMemoryRepository::new());
                let event = comment_event(&body, "OWNER", open_pr());
                send(&router(&repo), EventKind::IssueComment, &event).await.unwrap();
                assert!(repo.calls().await.is_empty(), "body {:?} made calls", body);
            });
        }

        #[test]
        fn test_unprivileged_actors_never_mutate_labels(
            association in prop::sample::select(
                AuthorAssociation::ALL
                    .iter()
                    .copied()
                    .filter(|a| !matches!(a, AuthorAssociation::Owner | AuthorAssociation::Collaborator))
                    .collect::<Vec<_>>()
            ),
            cancel in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let repo = Arc::new(
                    InMemoryRepository::new()
                        .with_repository_label("backport/v1.2")
                        .with_issue_labels(PR, &["backport/v1.2"]),
                );
                let command = if cancel { "cancel-backport" } else { "backport" };
                let mut event = comment_event(&format!("/tofubot {command} v1.2"), "NONE", open_pr());
                event["comment"]["author_association"] = serde_json::to_value(association).unwrap();
                event["issue"]["labels"] = json!([{ "name": "backport/v1.2" }]);

                send(&router(&repo), EventKind::IssueComment, &event).await.unwrap();

                assert_eq!(repo.calls().await, vec![Call::CreateComment(PR)]);
                assert!(repo.comments_on(PR).await[0].contains("you don't seem to have permissions"));
            });
        }
    }
}
