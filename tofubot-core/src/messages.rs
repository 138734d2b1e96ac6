//! Comment text posted back to pull requests and issues.

use crate::command::{CommandName, TRIGGER};
use crate::version::Version;

const HELP_TEMPLATE: &str = r#"👋 Hi @{requester}! I'm 🤖 TofuBot. I help with all kinds of tasks related to OpenTofu.

<details><summary>

## Here are all the commands I know

</summary>

### `{trigger} help`

Prints this help text.

### `{trigger} backport vX.Y`

Backports the current pull request to version vX.Y. If the pull request is not yet merged, it will create the backport PR when the original PR is merged. The current PR must be against the main branch.

### `{trigger} cancel-backport vX.Y`

Cancels a pending backport to version vX.Y.

</details>
"#;

/// Every reply tofubot can post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Help {
        requester: String,
    },
    WrongArgumentCount {
        requester: String,
        command: CommandName,
    },
    PermissionDenied {
        requester: String,
        command: CommandName,
    },
    NotAPullRequest {
        requester: String,
        command: CommandName,
    },
    InvalidVersion {
        requester: String,
        command: CommandName,
    },
    LabelLookupFailed {
        requester: String,
        error: String,
    },
    LabelMissing {
        requester: String,
        label: String,
    },
    LabelAddFailed {
        requester: String,
        error: String,
    },
    /// Label attached to an open pull request.
    BackportQueued {
        requester: String,
        version: Version,
    },
    /// Label attached to a pull request that is already closed.
    BackportScheduled {
        requester: String,
        version: Version,
    },
    BackportAlreadyOpen {
        requester: String,
        version: Version,
    },
    NothingToCancel {
        requester: String,
        version: Version,
    },
    CancelFailed {
        requester: String,
        error: String,
    },
    BackportCancelled {
        requester: String,
        version: Version,
    },
    BackportOpened {
        version: Version,
        pr_number: u64,
    },
    BackportFailed {
        version: Version,
        error: String,
    },
    /// The backport PR exists but its label state could not be recorded.
    /// `add` is `None` when the new label went on and only the removal failed.
    BackportOpenedLabelsStale {
        version: Version,
        pr_number: u64,
        add: Option<String>,
        remove: String,
        error: String,
    },
    /// The new state label went on but the old one could not be removed.
    LabelRollback {
        version: Version,
        kept: String,
        stale: String,
        error: String,
    },
}

fn error_block(error: &str) -> String {
    format!("Here's the error message:\n\n```\n{}\n```", error)
}

impl Reply {
    pub fn render(&self) -> String {
        match self {
            Reply::Help { requester } => HELP_TEMPLATE
                .replace("{requester}", requester)
                .replace("{trigger}", TRIGGER),

            Reply::WrongArgumentCount { requester, command } => {
                let lead = match command {
                    CommandName::CancelBackport => "Usage",
                    _ => "Try this",
                };
                format!(
                    "🤐 Hey @{}, looks like your command doesn't have the right amount of parameters.\n\n{}: `{}`",
                    requester,
                    lead,
                    command.usage()
                )
            }

            Reply::PermissionDenied { requester, command } => {
                let action = match command {
                    CommandName::CancelBackport => "cancel a backport",
                    _ => "create a backport",
                };
                format!(
                    "🤐 Hey @{}, you don't seem to have permissions to {}. Please ask a maintainer to do this for you. It's nothing personal, I swear.",
                    requester, action
                )
            }

            Reply::NotAPullRequest { requester, command } => {
                let ask = match command {
                    CommandName::CancelBackport => "to cancel a backport for an issue",
                    _ => "to backport an issue",
                };
                format!(
                    "😵‍💫 Hey @{}, looks like you are asking me {}? How am I supposed to do that? Try backporting a PR instead.",
                    requester, ask
                )
            }

            Reply::InvalidVersion { requester, command } => format!(
                "😵‍💫 Hey @{}, looks like you have the version branch number mixed up.\n\nTry this: `{}`",
                requester,
                command.usage()
            ),

            Reply::LabelLookupFailed { requester, error } => format!(
                "🤯 Hey @{}, I'm sorry but something went wrong while checking the project labels. {}",
                requester,
                error_block(error)
            ),

            Reply::LabelMissing { requester, label } => format!(
                "😵‍💫 Hey @{}, looks like the backport label `{}` doesn't exist. Can you check your version number?",
                requester, label
            ),

            Reply::LabelAddFailed { requester, error } => format!(
                "🤯 Hey @{}, I'm sorry but something went wrong while adding the backport label. {}",
                requester,
                error_block(error)
            ),

            Reply::BackportQueued { requester, version } => format!(
                "✅ Hey @{}, all right, I've queued up a backport to version {} when the PR merges.",
                requester, version
            ),

            Reply::BackportScheduled { requester, version } => format!(
                "✅ Hey @{}, all right, I'll create a PR to version {} shortly.",
                requester, version
            ),

            Reply::BackportAlreadyOpen { requester, version } => format!(
                "🤔 Hey @{}, there's already an open backport PR to version {} for this PR.",
                requester, version
            ),

            Reply::NothingToCancel { requester, version } => format!(
                "🤔 Hey @{}, there's no pending backport to version {} on this PR, so there's nothing to cancel.",
                requester, version
            ),

            Reply::CancelFailed { requester, error } => format!(
                "🤯 Hey @{}, I'm sorry but something went wrong while removing the backport label. {}",
                requester,
                error_block(error)
            ),

            Reply::BackportCancelled { requester, version } => format!(
                "✅ Hey @{}, all right, I've cancelled the backport to version {}.",
                requester, version
            ),

            Reply::BackportOpened { version, pr_number } => format!(
                "✅ I've opened #{} to backport this PR to version {}.",
                pr_number, version
            ),

            Reply::BackportFailed { version, error } => format!(
                "🤯 I'm sorry but I couldn't create the backport PR to version {}. {}\n\nOnce the problem is fixed, comment `{} backport {}` to try again.",
                version,
                error_block(error),
                TRIGGER,
                version
            ),

            Reply::BackportOpenedLabelsStale {
                version,
                pr_number,
                add,
                remove,
                error,
            } => {
                let fix = match add {
                    Some(add) => format!("add `{}` and remove `{}`", add, remove),
                    None => format!("remove `{}`", remove),
                };
                format!(
                    "⚠️ I've opened #{} to backport this PR to version {}, but I couldn't update the backport labels. Please {} by hand. {}",
                    pr_number,
                    version,
                    fix,
                    error_block(error)
                )
            }

            Reply::LabelRollback {
                version,
                kept,
                stale,
                error,
            } => format!(
                "🤯 I'm sorry but I couldn't finish updating the backport labels for version {}. This PR now carries both `{}` and `{}`; please remove `{}` by hand. {}",
                version,
                kept,
                stale,
                stale,
                error_block(error)
            ),
        }
    }
}
