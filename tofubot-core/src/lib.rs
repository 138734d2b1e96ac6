//! Pure decision logic for tofubot.
//!
//! Nothing in this crate performs I/O. The `tofubot` crate feeds webhook data
//! in and executes the label and comment changes that come out.

pub mod command;
pub mod labels;
pub mod messages;
pub mod permission;
pub mod types;
pub mod version;

pub use command::{Command, CommandName, CommandParser, ParseResult, Tokenizer, TRIGGER};
pub use labels::{BackportState, LabelSpec, LabelTransition, TrackingLabel, TransitionError};
pub use messages::Reply;
pub use permission::{authorize, Verdict};
pub use types::{AuthorAssociation, IssueState, Label};
pub use version::{Version, VersionError};
