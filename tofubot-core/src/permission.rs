//! Authorization of privileged commands.

use crate::command::CommandName;
use crate::messages::Reply;
use crate::types::AuthorAssociation;

/// Associations allowed to change backport state.
pub const PRIVILEGED_ASSOCIATIONS: &[AuthorAssociation] =
    &[AuthorAssociation::Owner, AuthorAssociation::Collaborator];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    /// The caller must post `reply` and stop.
    Denied { reply: Reply },
}

impl Verdict {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Verdict::Authorized)
    }
}

pub fn requires_authorization(command: CommandName) -> bool {
    match command {
        CommandName::Help => false,
        CommandName::Backport | CommandName::CancelBackport => true,
    }
}

/// Decide whether `requester`, with the given association, may run `command`.
pub fn authorize(
    association: AuthorAssociation,
    command: CommandName,
    requester: &str,
) -> Verdict {
    if !requires_authorization(command) || PRIVILEGED_ASSOCIATIONS.contains(&association) {
        return Verdict::Authorized;
    }
    Verdict::Denied {
        reply: Reply::PermissionDenied {
            requester: requester.to_string(),
            command,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_and_collaborator_may_backport() {
        for association in [AuthorAssociation::Owner, AuthorAssociation::Collaborator] {
            for command in [CommandName::Backport, CommandName::CancelBackport] {
                assert_eq!(authorize(association, command, "alice"), Verdict::Authorized);
            }
        }
    }

    #[test]
    fn test_everyone_else_is_denied() {
        for association in AuthorAssociation::ALL {
            if PRIVILEGED_ASSOCIATIONS.contains(&association) {
                continue;
            }
            for command in [CommandName::Backport, CommandName::CancelBackport] {
                assert_eq!(
                    authorize(association, command, "bob"),
                    Verdict::Denied {
                        reply: Reply::PermissionDenied {
                            requester: "bob".to_string(),
                            command
                        }
                    },
                    "{association} should not be allowed to run {command}"
                );
            }
        }
    }

    #[test]
    fn test_member_is_not_privileged() {
        assert!(!authorize(AuthorAssociation::Member, CommandName::Backport, "m").is_authorized());
    }

    #[test]
    fn test_help_needs_no_authorization() {
        for association in AuthorAssociation::ALL {
            assert!(authorize(association, CommandName::Help, "anyone").is_authorized());
        }
    }
}
