//! Serializing state store for the dataset tree.
//!
//! All mutations go through [`TreeStore::apply`], one action at a time. Each
//! call reports a [`StateChange`] so the runtime can tell the controller when
//! the path moved.
//!
//! Open branches survive a reset: `ResetChildren` remembers which children
//! were expanded (and their members), and the next children load for the
//! current path reopens them.

use std::collections::BTreeMap;

use super::model::{ChildMeta, ChildrenSet, Organization, TreeState};

/// Expanded children set aside by a reset, with their last known members.
type Reopen = BTreeMap<String, Option<Vec<String>>>;

/// Mutations the store understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    SetPath(String),
    ResetChildren,
    /// A children fetch for `path` was handed to the dispatcher.
    FetchStarted(String),
    /// Children for `path` arrived.
    ChildrenLoaded {
        path: String,
        children: Vec<(String, Organization)>,
    },
    /// Members for `child` arrived.
    MembersLoaded { child: String, members: Vec<String> },
    /// A children fetch for `path` failed.
    FetchFailed { path: String, message: String },
    /// A members fetch for `child` failed.
    MembersFailed { child: String, message: String },
    ToggleChild(String),
    SetSession { username: String, validated: bool },
}

/// Change notification returned from every `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous_path: String,
    pub path_changed: bool,
    /// Whether anything observable changed at all.
    pub changed: bool,
}

/// Owner of the [`TreeState`].
#[derive(Debug, Default)]
pub struct TreeStore {
    state: TreeState,
    in_flight: u32,
    /// Dropped responses for paths that were no longer current.
    stale_responses: u64,
    reopen: Reopen,
}

impl TreeStore {
    #[must_use]
    pub fn new(initial: TreeState) -> Self {
        Self {
            state: initial,
            in_flight: 0,
            stale_responses: 0,
            reopen: Reopen::new(),
        }
    }

    /// Read-only snapshot for the controller and render surface.
    #[must_use]
    pub fn state(&self) -> &TreeState {
        &self.state
    }

    /// Children fetches currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    #[must_use]
    pub fn stale_responses(&self) -> u64 {
        self.stale_responses
    }

    /// Children waiting to be reopened by the next load.
    #[must_use]
    pub fn pending_reopen(&self) -> usize {
        self.reopen.len()
    }

    /// Apply one action.
    pub fn apply(&mut self, action: StoreAction) -> StateChange {
        let before = self.state.clone();
        let previous_path = before.path.clone();

        match action {
            StoreAction::SetPath(path) => {
                self.state.path = path;
            }
            StoreAction::ResetChildren => {
                for (id, meta) in std::mem::take(&mut self.state.children) {
                    if meta.expanded {
                        self.reopen.insert(id, meta.members);
                    }
                }
            }
            StoreAction::FetchStarted(_) => {
                self.in_flight = self.in_flight.saturating_add(1);
                self.state.last_error = None;
            }
            StoreAction::ChildrenLoaded { path, children } => {
                self.finish_fetch();
                if path == self.state.path {
                    merge_children(&mut self.state.children, children);
                    reopen_children(&mut self.state.children, std::mem::take(&mut self.reopen));
                } else {
                    self.stale_responses += 1;
                }
            }
            StoreAction::FetchFailed { path, message } => {
                self.finish_fetch();
                if path == self.state.path {
                    self.reopen.clear();
                    self.state.last_error = Some(message);
                } else {
                    self.stale_responses += 1;
                }
            }
            StoreAction::MembersLoaded { child, members } => {
                if let Some(meta) = self.state.children.get_mut(&child) {
                    meta.members = Some(members);
                } else if let Some(stashed) = self.reopen.get_mut(&child) {
                    *stashed = Some(members);
                }
            }
            StoreAction::MembersFailed { child, message } => {
                if self.state.children.contains_key(&child) {
                    self.state.last_error = Some(message);
                }
            }
            StoreAction::ToggleChild(id) => {
                if let Some(meta) = self.state.children.get_mut(&id) {
                    meta.expanded = !meta.expanded;
                }
            }
            StoreAction::SetSession {
                username,
                validated,
            } => {
                self.state.username = username;
                self.state.validated = validated;
            }
        }
        self.state.is_fetching = self.in_flight > 0;

        StateChange {
            path_changed: previous_path != self.state.path,
            changed: before != self.state,
            previous_path,
        }
    }

    fn finish_fetch(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Insert fetched children, keeping the expanded flag and members of any
/// child that is already present.
fn merge_children(set: &mut ChildrenSet, incoming: Vec<(String, Organization)>) {
    for (id, organization) in incoming {
        set.entry(id)
            .and_modify(|meta| meta.organization = organization.clone())
            .or_insert_with(|| ChildMeta::new(organization));
    }
}

/// Expand the set-aside children that came back; the rest are gone.
fn reopen_children(set: &mut ChildrenSet, reopen: Reopen) {
    for (id, members) in reopen {
        if let Some(meta) = set.get_mut(&id) {
            meta.expanded = true;
            if meta.members.is_none() {
                meta.members = members;
            }
        }
    }
}
