//! Tracking-label taxonomy and backport state transitions.
//!
//! For each (pull request, version) pair the labels on the pull request are
//! the only record of backport state:
//!
//! | label                      | state       |
//! |----------------------------|-------------|
//! | *(none)*                   | not wanted  |
//! | `backport/<v>`             | `Requested` |
//! | `backport/<v>/open`        | `Open`      |
//! | `backport/<v>/failed`      | `Failed`    |
//!
//! Transitions are computed here as plain data; the caller applies them to the
//! remote label store.

use thiserror::Error;

use crate::version::Version;

pub const LABEL_PREFIX: &str = "backport/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackportState {
    Requested,
    Open,
    Failed,
}

/// Static description of the label that encodes one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTemplate {
    pub state: BackportState,
    pub suffix: &'static str,
    pub color: &'static str,
    /// `{version}` is replaced with the version name.
    pub description: &'static str,
}

pub const LABEL_TEMPLATES: [LabelTemplate; 3] = [
    LabelTemplate {
        state: BackportState::Requested,
        suffix: "",
        color: "10315b",
        description: "Pending backport to version {version}",
    },
    LabelTemplate {
        state: BackportState::Open,
        suffix: "/open",
        color: "105b14",
        description: "Automatic backport PR to version {version} open",
    },
    LabelTemplate {
        state: BackportState::Failed,
        suffix: "/failed",
        color: "5b1010",
        description: "Automatic backport PR to version {version} failed",
    },
];

impl BackportState {
    pub fn template(self) -> &'static LabelTemplate {
        match self {
            BackportState::Requested => &LABEL_TEMPLATES[0],
            BackportState::Open => &LABEL_TEMPLATES[1],
            BackportState::Failed => &LABEL_TEMPLATES[2],
        }
    }

    pub fn label_name(self, version: &Version) -> String {
        format!("{LABEL_PREFIX}{version}{}", self.template().suffix)
    }
}

/// A label to be created at repository scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
    pub description: String,
}

impl LabelSpec {
    pub fn for_state(state: BackportState, version: &Version) -> Self {
        let template = state.template();
        Self {
            name: state.label_name(version),
            color: template.color.to_string(),
            description: template
                .description
                .replace("{version}", version.as_str()),
        }
    }
}

/// The three labels announced for a new release branch, requested first.
pub fn label_specs(version: &Version) -> Vec<LabelSpec> {
    LABEL_TEMPLATES
        .iter()
        .map(|template| LabelSpec::for_state(template.state, version))
        .collect()
}

/// A label name decoded into version and state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingLabel {
    pub version: Version,
    pub state: BackportState,
}

impl TrackingLabel {
    /// Decode a label name. Returns `None` for labels outside the taxonomy,
    /// including `backport/` labels whose version does not parse.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(LABEL_PREFIX)?;
        let (version, state) = if let Some(v) = rest.strip_suffix("/open") {
            (v, BackportState::Open)
        } else if let Some(v) = rest.strip_suffix("/failed") {
            (v, BackportState::Failed)
        } else {
            (rest, BackportState::Requested)
        };
        let version = Version::parse(version).ok()?;
        Some(Self { version, state })
    }

    pub fn name(&self) -> String {
        self.state.label_name(&self.version)
    }
}

/// Versions with an outstanding request, in label order, without duplicates.
pub fn pending_versions<'a, I>(label_names: I) -> Vec<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut versions: Vec<Version> = Vec::new();
    for name in label_names {
        if let Some(label) = TrackingLabel::parse(name) {
            if label.state == BackportState::Requested && !versions.contains(&label.version) {
                versions.push(label.version);
            }
        }
    }
    versions
}

/// The authoritative state for `version` given a pull request's labels.
///
/// Several state labels can coexist after a partial label update. `Open`
/// wins because the backport exists. `Requested` beats `Failed`: the only way
/// to hold both is a re-request after a failure whose cleanup did not finish,
/// and that retry is the newer intent.
pub fn current_state<'a, I>(label_names: I, version: &Version) -> Option<BackportState>
where
    I: IntoIterator<Item = &'a str>,
{
    label_names
        .into_iter()
        .filter_map(TrackingLabel::parse)
        .filter(|label| &label.version == version)
        .map(|label| label.state)
        .max_by_key(|state| match state {
            BackportState::Failed => 0,
            BackportState::Requested => 1,
            BackportState::Open => 2,
        })
}

/// What happened to a backport for one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackportEvent {
    /// A maintainer asked for the backport
    Requested,
    /// A maintainer withdrew the request
    Cancelled,
    /// The backport pull request was opened
    Opened,
    /// Opening the backport pull request failed
    CreationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a backport pull request to {0} is already open")]
    AlreadyOpen(Version),
    #[error("there is no pending backport request for {0}")]
    NotRequested(Version),
}

/// Label changes that move one version from `from` to `to`.
///
/// Apply by adding first and removing second, so that a failure between the
/// two steps leaves both labels rather than none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTransition {
    pub version: Version,
    pub from: Option<BackportState>,
    pub to: Option<BackportState>,
}

impl LabelTransition {
    pub fn label_to_add(&self) -> Option<String> {
        match (self.from, self.to) {
            (from, Some(to)) if from != Some(to) => Some(to.label_name(&self.version)),
            _ => None,
        }
    }

    pub fn label_to_remove(&self) -> Option<String> {
        match (self.from, self.to) {
            (Some(from), to) if to != Some(from) => Some(from.label_name(&self.version)),
            _ => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Pure transition function for one version's backport state.
pub fn transition(
    version: &Version,
    current: Option<BackportState>,
    event: BackportEvent,
) -> Result<LabelTransition, TransitionError> {
    use BackportState::*;

    let to = match (current, event) {
        (Some(Open), BackportEvent::Requested) => {
            return Err(TransitionError::AlreadyOpen(version.clone()))
        }
        // Re-requesting after a failure retries the backport.
        (None | Some(Requested) | Some(Failed), BackportEvent::Requested) => Some(Requested),
        (Some(Requested), BackportEvent::Cancelled) => None,
        (Some(Requested), BackportEvent::Opened) => Some(Open),
        (Some(Requested), BackportEvent::CreationFailed) => Some(Failed),
        (_, _) => return Err(TransitionError::NotRequested(version.clone())),
    };

    Ok(LabelTransition {
        version: version.clone(),
        from: current,
        to,
    })
}
