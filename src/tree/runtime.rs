//! Session runtime: owns the store, controller, timers and dispatcher, and
//! carries out controller commands.
//!
//! Architecture: one thread, one inbox. User input and fetch outcomes arrive
//! as [`SessionEvent`]s on a crossbeam channel; the loop waits with
//! `recv_deadline` bounded by the next armed timer. Commands returned by
//! [`update`] run in FIFO order, and every `SetPath` that moves the path is
//! fed back to the controller as `PathChanged`.

use std::collections::VecDeque;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::controller::{ControllerSettings, RefreshController, update};
use super::dispatcher::{FetchDispatcher, FetchJob, FetchOutcome};
use super::model::{ControllerCmd, ControllerMsg, TreeState};
use super::render::{TreeView, render};
use super::store::{StoreAction, TreeStore};
use super::timer::TimerQueue;
use crate::core::errors::{DstError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

/// Commands a user can issue to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    EditPath(String),
    Refresh,
    Submit,
    Toggle(String),
    /// Present the current view even if it did not change.
    Show,
    Quit,
}

/// Everything that can wake the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    Input(UserInput),
    Fetched(FetchOutcome),
    Shutdown,
}

impl From<FetchOutcome> for SessionEvent {
    fn from(outcome: FetchOutcome) -> Self {
        Self::Fetched(outcome)
    }
}

impl From<UserInput> for SessionEvent {
    fn from(input: UserInput) -> Self {
        Self::Input(input)
    }
}

/// Where rendered views go.
pub trait RenderSink {
    fn present(&mut self, view: &TreeView);
}

/// Whether the loop should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// A mounted tree browser.
pub struct Session<D, S>
where
    D: FetchDispatcher,
    S: RenderSink,
{
    store: TreeStore,
    controller: RefreshController,
    timers: TimerQueue,
    dispatcher: D,
    sink: S,
    logger: Option<ActivityLoggerHandle>,
    last_view: Option<TreeView>,
    /// Children fetches in submission order, for duration reporting.
    started: VecDeque<(String, Instant)>,
    mounted_at: Option<Instant>,
    stopped: bool,
}

impl<D, S> Session<D, S>
where
    D: FetchDispatcher,
    S: RenderSink,
{
    pub fn new(initial: TreeState, settings: ControllerSettings, dispatcher: D, sink: S) -> Self {
        Self {
            store: TreeStore::new(initial),
            controller: RefreshController::new(settings),
            timers: TimerQueue::new(),
            dispatcher,
            sink,
            logger: None,
            last_view: None,
            started: VecDeque::new(),
            mounted_at: None,
            stopped: false,
        }
    }

    /// Attach the activity logger.
    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn state(&self) -> &TreeState {
        self.store.state()
    }

    #[must_use]
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    #[must_use]
    pub fn controller(&self) -> &RefreshController {
        &self.controller
    }

    #[must_use]
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Mount the controller and draw the first frame.
    pub fn start(&mut self, now: Instant) {
        self.mounted_at = Some(now);
        self.dispatch(ControllerMsg::Init, now);
        self.present(false);
    }

    /// Earliest armed refresh deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Handle one event and redraw if the view changed.
    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) -> Flow {
        if self.stopped {
            return Flow::Stop;
        }
        let flow = match event {
            SessionEvent::Input(input) => self.handle_input(input, now),
            SessionEvent::Fetched(outcome) => {
                self.handle_outcome(outcome, now);
                Flow::Continue
            }
            SessionEvent::Shutdown => Flow::Stop,
        };
        self.present(false);
        flow
    }

    /// Fire every timer whose deadline has passed.
    pub fn fire_due(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        for id in self.timers.pop_due(now) {
            if let Some(pending) = self.controller.pending()
                && pending.id == id
            {
                self.log(ActivityEvent::RefreshFired {
                    timer: id.0,
                    path: pending.path.clone(),
                });
            }
            self.dispatch(ControllerMsg::RefreshFired(id), now);
        }
        self.present(false);
    }

    /// Unmount: cancel the pending refresh and stop the dispatcher.
    pub fn teardown(&mut self, now: Instant, reason: &str) {
        if self.stopped {
            return;
        }
        self.dispatch(ControllerMsg::Teardown, now);
        self.timers.clear();
        self.dispatcher.shutdown();
        self.stopped = true;
        let uptime_ms = self
            .mounted_at
            .map_or(0, |at| duration_ms(now.saturating_duration_since(at)));
        self.log(ActivityEvent::SessionStopped {
            reason: reason.to_string(),
            uptime_ms,
        });
    }

    /// Drive the session until `Quit`, `Shutdown`, or the inbox closes.
    pub fn run(mut self, inbox: &Receiver<SessionEvent>) -> Result<Self> {
        self.start(Instant::now());
        let mut reason = "quit";
        loop {
            let received = match self.next_deadline() {
                Some(deadline) => inbox.recv_deadline(deadline),
                None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    if self.handle_event(event, Instant::now()) == Flow::Stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.fire_due(Instant::now()),
                Err(RecvTimeoutError::Disconnected) => {
                    reason = "inbox closed";
                    break;
                }
            }
        }
        self.teardown(Instant::now(), reason);
        if reason == "quit" {
            Ok(self)
        } else {
            Err(DstError::ChannelClosed {
                component: "session-inbox",
            })
        }
    }

    // ──────────────────── internals ────────────────────

    fn handle_input(&mut self, input: UserInput, now: Instant) -> Flow {
        match input {
            UserInput::EditPath(raw) => self.dispatch(ControllerMsg::EditPath(raw), now),
            UserInput::Refresh => {
                self.log(ActivityEvent::RefreshRequested {
                    path: self.store.state().path.clone(),
                    source: "refresh",
                });
                self.dispatch(ControllerMsg::Refresh, now);
            }
            UserInput::Submit => {
                self.log(ActivityEvent::RefreshRequested {
                    path: self.store.state().path.clone(),
                    source: "submit",
                });
                self.dispatch(ControllerMsg::SubmitPath, now);
            }
            UserInput::Toggle(id) => self.dispatch(ControllerMsg::ToggleChild(id), now),
            UserInput::Show => self.present(true),
            UserInput::Quit => return Flow::Stop,
        }
        Flow::Continue
    }

    fn handle_outcome(&mut self, outcome: FetchOutcome, now: Instant) {
        match outcome {
            FetchOutcome::Children { path, result } => {
                let elapsed = self.take_started(&path, now);
                match result {
                    Ok(children) => {
                        let count = children.len();
                        let stale = path != self.store.state().path;
                        self.store.apply(StoreAction::ChildrenLoaded {
                            path: path.clone(),
                            children,
                        });
                        self.log(ActivityEvent::FetchCompleted {
                            path,
                            count,
                            duration_ms: elapsed,
                            stale,
                        });
                    }
                    Err(err) => self.fail_fetch(path, &err),
                }
            }
            FetchOutcome::Members { child, result } => match result {
                Ok(members) => {
                    let count = members.len();
                    self.store.apply(StoreAction::MembersLoaded {
                        child: child.clone(),
                        members,
                    });
                    self.log(ActivityEvent::MembersFetched { child, count });
                }
                Err(err) => {
                    self.log(ActivityEvent::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    self.store.apply(StoreAction::MembersFailed {
                        child,
                        message: err.to_string(),
                    });
                }
            },
        }
    }

    /// Run `msg` through the controller and execute the resulting commands.
    fn dispatch(&mut self, msg: ControllerMsg, now: Instant) {
        let mut queue: VecDeque<ControllerCmd> =
            update(&mut self.controller, self.store.state(), msg)
                .into_vec()
                .into();
        while let Some(cmd) = queue.pop_front() {
            if let Some(follow_up) = self.execute(cmd, now) {
                let cmds = update(&mut self.controller, self.store.state(), follow_up);
                queue.extend(cmds.into_vec());
            }
        }
    }

    /// Carry out one command. Returns a message to feed back, if any.
    fn execute(&mut self, cmd: ControllerCmd, now: Instant) -> Option<ControllerMsg> {
        match cmd {
            ControllerCmd::None | ControllerCmd::Batch(_) => None,
            ControllerCmd::SetPath(path) => {
                let change = self.store.apply(StoreAction::SetPath(path));
                if !change.path_changed {
                    return None;
                }
                self.log(ActivityEvent::PathChanged {
                    from: change.previous_path.clone(),
                    to: self.store.state().path.clone(),
                });
                Some(ControllerMsg::PathChanged {
                    previous: change.previous_path,
                })
            }
            ControllerCmd::ResetChildren => {
                self.store.apply(StoreAction::ResetChildren);
                None
            }
            ControllerCmd::FetchChildren(path) => {
                self.store.apply(StoreAction::FetchStarted(path.clone()));
                self.log(ActivityEvent::FetchStarted { path: path.clone() });
                match self.dispatcher.submit(FetchJob::Children(path.clone())) {
                    Ok(()) => self.started.push_back((path, now)),
                    Err(err) => self.fail_fetch(path, &err),
                }
                None
            }
            ControllerCmd::FetchMembers(child) => {
                if let Err(err) = self.dispatcher.submit(FetchJob::Members(child.clone())) {
                    self.store.apply(StoreAction::MembersFailed {
                        child,
                        message: err.to_string(),
                    });
                }
                None
            }
            ControllerCmd::ToggleChild(id) => {
                self.store.apply(StoreAction::ToggleChild(id));
                None
            }
            ControllerCmd::ScheduleRefresh { timer, after } => {
                self.timers.schedule(timer, now, after);
                let path = self
                    .controller
                    .pending()
                    .map_or_else(String::new, |p| p.path.clone());
                self.log(ActivityEvent::RefreshScheduled {
                    timer: timer.0,
                    path,
                    delay_ms: duration_ms(after),
                });
                None
            }
            ControllerCmd::CancelRefresh(timer) => {
                self.timers.cancel(timer);
                None
            }
        }
    }

    fn fail_fetch(&mut self, path: String, err: &DstError) {
        self.log(ActivityEvent::FetchFailed {
            path: path.clone(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        });
        self.store.apply(StoreAction::FetchFailed {
            path,
            message: err.to_string(),
        });
    }

    fn take_started(&mut self, path: &str, now: Instant) -> u64 {
        self.started
            .iter()
            .position(|(p, _)| p == path)
            .and_then(|idx| self.started.remove(idx))
            .map_or(0, |(_, at)| duration_ms(now.saturating_duration_since(at)))
    }

    fn present(&mut self, force: bool) {
        let view = render(self.store.state());
        if force || self.last_view.as_ref() != Some(&view) {
            self.sink.present(&view);
            self.last_view = Some(view);
        }
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
