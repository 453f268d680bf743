//! Path-scoped refresh controller.
//!
//! `update()` takes the controller, a read-only snapshot of the store, and a
//! message, and returns the requests the runtime should carry out. It watches
//! the current path and refetches the children set when the path settles,
//! when the path form is submitted, or when the user asks for a refresh.
//!
//! **Design invariant:** this module performs zero I/O and owns at most one
//! [`PendingTimer`]. Arming a new timer always cancels the previous one.

use std::time::Duration;

use super::model::{ControllerCmd, ControllerMsg, TreeState};
use super::timer::{DEFAULT_DEBOUNCE, PendingTimer, TimerIds};
use crate::core::qualifier;

/// Knobs resolved from configuration before the controller is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Quiet period between the last path edit and the refetch.
    pub debounce: Duration,
    /// Path used on mount when nothing is loaded. Empty = session username.
    pub default_path: String,
    /// Uppercase path edits before recording them.
    pub uppercase_paths: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            default_path: String::new(),
            uppercase_paths: true,
        }
    }
}

/// Controller state: the owned timer handle and lifecycle flags.
#[derive(Debug)]
pub struct RefreshController {
    settings: ControllerSettings,
    pending: Option<PendingTimer>,
    ids: TimerIds,
    /// Set by `Init` when it requests a path change; the matching
    /// `PathChanged` is consumed without debouncing.
    initial_transition: Option<String>,
    torn_down: bool,
}

impl RefreshController {
    #[must_use]
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            settings,
            pending: None,
            ids: TimerIds::default(),
            initial_transition: None,
            torn_down: false,
        }
    }

    /// The live deferred refresh, if one is armed.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingTimer> {
        self.pending.as_ref()
    }

    /// Whether the mount-time path transition is still expected.
    #[must_use]
    pub fn awaiting_initial_transition(&self) -> bool {
        self.initial_transition.is_some()
    }

    #[must_use]
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn default_path(&self, state: &TreeState) -> String {
        if self.settings.default_path.is_empty() {
            qualifier::normalize(&state.username, self.settings.uppercase_paths)
        } else {
            self.settings.default_path.clone()
        }
    }

    /// Disarm the live timer, if any, returning the cancel request.
    fn cancel_pending(&mut self) -> ControllerCmd {
        self.pending
            .take()
            .map_or(ControllerCmd::None, |timer| {
                ControllerCmd::CancelRefresh(timer.id)
            })
    }

    /// Cancel the live timer and arm a fresh one for `path`.
    fn rearm(&mut self, path: &str) -> ControllerCmd {
        let cancel = self.cancel_pending();
        let id = self.ids.allocate();
        self.pending = Some(PendingTimer {
            id,
            path: path.to_string(),
        });
        ControllerCmd::batch(vec![
            cancel,
            ControllerCmd::ScheduleRefresh {
                timer: id,
                after: self.settings.debounce,
            },
        ])
    }
}

/// Apply a message and return the requests for the runtime.
///
/// Every controller transition goes through this function.
pub fn update(ctl: &mut RefreshController, state: &TreeState, msg: ControllerMsg) -> ControllerCmd {
    if ctl.torn_down {
        return ControllerCmd::None;
    }

    match msg {
        ControllerMsg::Init => {
            if !state.children.is_empty() {
                return ControllerCmd::None;
            }
            let path = ctl.default_path(state);
            if state.path != path {
                ctl.initial_transition = Some(path.clone());
            }
            ControllerCmd::batch(vec![
                ControllerCmd::SetPath(path.clone()),
                ControllerCmd::FetchChildren(path),
            ])
        }

        ControllerMsg::PathChanged { previous } => {
            if previous == state.path {
                return ControllerCmd::None;
            }
            if let Some(target) = ctl.initial_transition.take()
                && target == state.path
            {
                // Mount already fetched this path.
                return ControllerCmd::None;
            }
            ctl.rearm(&state.path)
        }

        ControllerMsg::RefreshFired(id) => match ctl.pending.take() {
            Some(timer) if timer.id == id => ControllerCmd::batch(vec![
                ControllerCmd::ResetChildren,
                ControllerCmd::FetchChildren(timer.path),
            ]),
            other => {
                // Stale timer: keep whatever is live.
                ctl.pending = other;
                ControllerCmd::None
            }
        },

        ControllerMsg::Refresh => {
            let mut cmds = vec![
                ctl.cancel_pending(),
                ControllerCmd::ResetChildren,
                ControllerCmd::FetchChildren(state.path.clone()),
            ];
            cmds.extend(
                state
                    .children
                    .iter()
                    .filter(|(_, child)| child.expanded)
                    .map(|(id, _)| ControllerCmd::FetchMembers(id.clone())),
            );
            ControllerCmd::batch(cmds)
        }

        ControllerMsg::SubmitPath => ControllerCmd::batch(vec![
            ctl.cancel_pending(),
            ControllerCmd::ResetChildren,
            ControllerCmd::FetchChildren(state.path.clone()),
        ]),

        ControllerMsg::EditPath(raw) => {
            let value = qualifier::normalize(&raw, ctl.settings.uppercase_paths);
            if value == state.path {
                ControllerCmd::None
            } else {
                ControllerCmd::SetPath(value)
            }
        }

        ControllerMsg::ToggleChild(id) => {
            let Some(child) = state.children.get(&id) else {
                return ControllerCmd::None;
            };
            let opening = !child.expanded;
            let fetch = if opening && child.organization.has_members() {
                ControllerCmd::FetchMembers(id.clone())
            } else {
                ControllerCmd::None
            };
            ControllerCmd::batch(vec![ControllerCmd::ToggleChild(id), fetch])
        }

        ControllerMsg::Teardown => {
            ctl.torn_down = true;
            ctl.initial_transition = None;
            ctl.cancel_pending()
        }
    }
}
