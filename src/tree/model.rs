//! Elm-style state model for the dataset tree.
//!
//! The store owns a [`TreeState`]; the controller reads it as a snapshot.
//! Events reach the controller as [`ControllerMsg`] values and side-effects
//! leave it as [`ControllerCmd`] values.
//!
//! **Design invariant:** nothing in this module performs I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ──────────────────── dataset metadata ────────────────────

/// Dataset organization as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Organization {
    /// Partitioned dataset (PDS/PDSE): has members.
    Partitioned,
    /// Physical sequential dataset.
    Sequential,
    /// Anything else (VSAM clusters, unknown DSORGs).
    Other(String),
}

impl From<String> for Organization {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "po" | "po-e" | "pds" | "pdse" | "partitioned" => Self::Partitioned,
            "ps" | "sequential" => Self::Sequential,
            _ => Self::Other(raw),
        }
    }
}

impl From<Organization> for String {
    fn from(org: Organization) -> Self {
        org.label().to_string()
    }
}

impl Organization {
    /// Short DSORG-style label for display.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Partitioned => "PO",
            Self::Sequential => "PS",
            Self::Other(raw) => raw,
        }
    }

    /// Whether members can be listed for this organization.
    #[must_use]
    pub const fn has_members(&self) -> bool {
        matches!(self, Self::Partitioned)
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata for one child in the children set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildMeta {
    pub organization: Organization,
    /// Whether the node is open and its members should stay populated.
    pub expanded: bool,
    /// Loaded members; `None` until a members fetch completes.
    pub members: Option<Vec<String>>,
}

impl ChildMeta {
    /// Fresh, collapsed child with no members loaded.
    #[must_use]
    pub const fn new(organization: Organization) -> Self {
        Self {
            organization,
            expanded: false,
            members: None,
        }
    }
}

/// Child identifier → metadata, ordered by identifier.
pub type ChildrenSet = BTreeMap<String, ChildMeta>;

// ──────────────────── state snapshot ────────────────────

/// Everything the controller and the render surface read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeState {
    /// Current subtree scope.
    pub path: String,
    pub children: ChildrenSet,
    /// True while any children fetch is outstanding.
    pub is_fetching: bool,
    /// Viewer is authorized to see the tree.
    pub validated: bool,
    pub username: String,
    /// Most recent fetch failure, for the status line.
    pub last_error: Option<String>,
}

impl TreeState {
    /// Snapshot for an authorized session with nothing loaded yet.
    #[must_use]
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            validated: true,
            ..Self::default()
        }
    }
}

/// Expanded flag for `child_id`, or `false` when the child is unknown.
#[must_use]
pub fn is_toggled(state: &TreeState, child_id: &str) -> bool {
    state
        .children
        .get(child_id)
        .is_some_and(|child| child.expanded)
}

// ──────────────────── timers ────────────────────

/// Opaque identity of a scheduled deferred refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ──────────────────── messages ────────────────────

/// Events delivered to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerMsg {
    /// The controller was mounted.
    Init,
    /// The store reports the path moved away from `previous`.
    PathChanged { previous: String },
    /// A scheduled refresh timer elapsed.
    RefreshFired(TimerId),
    /// Explicit refresh: bypass the debounce and reopen expanded children.
    Refresh,
    /// Path form submitted: bypass the debounce.
    SubmitPath,
    /// User typed into the path field.
    EditPath(String),
    /// User opened or closed a child node.
    ToggleChild(String),
    /// The controller is being discarded.
    Teardown,
}

// ──────────────────── commands ────────────────────

/// Requests returned by the controller for the runtime to carry out.
///
/// The controller never touches the store, the dispatcher, or the clock
/// directly; every effect is one of these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCmd {
    /// No side-effect.
    None,
    /// Record a new current path.
    SetPath(String),
    /// Clear the children set.
    ResetChildren,
    /// Load the children for a path.
    FetchChildren(String),
    /// Load the members of one child.
    FetchMembers(String),
    /// Flip a child's expanded flag.
    ToggleChild(String),
    /// Arm the deferred refresh timer.
    ScheduleRefresh { timer: TimerId, after: Duration },
    /// Disarm a previously scheduled refresh timer.
    CancelRefresh(TimerId),
    /// Execute multiple commands in order.
    Batch(Vec<Self>),
}

impl ControllerCmd {
    /// Flatten nested batches into execution order, dropping `None`.
    #[must_use]
    pub fn into_vec(self) -> Vec<Self> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Self>) {
        match self {
            Self::None => {}
            Self::Batch(cmds) => {
                for cmd in cmds {
                    cmd.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }

    /// Build a batch, collapsing trivial cases.
    #[must_use]
    pub fn batch(mut cmds: Vec<Self>) -> Self {
        cmds.retain(|c| !matches!(c, Self::None));
        match cmds.len() {
            0 => Self::None,
            1 => cmds.pop().unwrap_or(Self::None),
            _ => Self::Batch(cmds),
        }
    }
}

// ──────────────────── tests ────────────────────
