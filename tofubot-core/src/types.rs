//! Domain types shared with the GitHub webhook and REST payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The commenter's relationship to the repository, as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Collaborator,
    Contributor,
    FirstTimer,
    FirstTimeContributor,
    Mannequin,
    Member,
    None,
    Owner,
}

impl AuthorAssociation {
    pub const ALL: [AuthorAssociation; 8] = [
        AuthorAssociation::Collaborator,
        AuthorAssociation::Contributor,
        AuthorAssociation::FirstTimer,
        AuthorAssociation::FirstTimeContributor,
        AuthorAssociation::Mannequin,
        AuthorAssociation::Member,
        AuthorAssociation::None,
        AuthorAssociation::Owner,
    ];
}

impl fmt::Display for AuthorAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthorAssociation::Collaborator => "COLLABORATOR",
            AuthorAssociation::Contributor => "CONTRIBUTOR",
            AuthorAssociation::FirstTimer => "FIRST_TIMER",
            AuthorAssociation::FirstTimeContributor => "FIRST_TIME_CONTRIBUTOR",
            AuthorAssociation::Mannequin => "MANNEQUIN",
            AuthorAssociation::Member => "MEMBER",
            AuthorAssociation::None => "NONE",
            AuthorAssociation::Owner => "OWNER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A repository or issue label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub default: bool,
}

impl Label {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: String::new(),
            default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_association_wire_names() {
        for association in AuthorAssociation::ALL {
            let json = serde_json::to_string(&association).unwrap();
            assert_eq!(json, format!("\"{}\"", association));
            let back: AuthorAssociation = serde_json::from_str(&json).unwrap();
            assert_eq!(back, association);
        }
    }

    #[test]
    fn test_label_tolerates_null_description() {
        let label: Label = serde_json::from_str(
            r#"{"name":"backport/v1.2","description":null,"color":"10315b","default":false}"#,
        )
        .unwrap();
        assert_eq!(label.name, "backport/v1.2");
        assert_eq!(label.description, None);
    }
}
