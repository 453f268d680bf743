//! Headless session harness with a virtual clock.
//!
//! Drives the full store/controller/runtime/render pipeline against an
//! in-memory [`Catalog`]. Fetch jobs are queued, not run, until the test
//! calls [`TreeHarness::deliver`], so response ordering and timing are fully
//! deterministic. Time only moves through [`TreeHarness::advance`].
//!
//! ```rust,ignore
//! let mut h = TreeHarness::default();
//! h.deliver();
//! h.type_path("ibmuser.proclib");
//! h.advance_ms(1500);
//! h.deliver();
//! h.last_frame().assert_contains("IBMUSER.PROCLIB");
//! ```

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::catalog::{Catalog, DatasetEntry};
use super::controller::ControllerSettings;
use super::dispatcher::{FetchDispatcher, FetchJob, run_job};
use super::model::{Organization, TreeState};
use super::render::{TreeView, to_text};
use super::runtime::{RenderSink, Session, SessionEvent, UserInput};
use crate::core::errors::Result;

// ──────────────────── frame snapshot ────────────────────

/// One presented frame.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub text: String,
    /// Virtual time since the harness started.
    pub at: Duration,
}

impl FrameSnapshot {
    #[track_caller]
    pub fn assert_contains(&self, needle: &str) {
        assert!(
            self.text.contains(needle),
            "frame does not contain {needle:?}.\nFrame:\n{}",
            self.text,
        );
    }

    #[track_caller]
    pub fn assert_not_contains(&self, needle: &str) {
        assert!(
            !self.text.contains(needle),
            "frame unexpectedly contains {needle:?}.\nFrame:\n{}",
            self.text,
        );
    }
}

/// Scriptable step for replay.
#[derive(Debug, Clone)]
pub enum HarnessStep {
    Type(String),
    AdvanceMs(u64),
    Submit,
    Refresh,
    Toggle(String),
    /// Run every queued fetch job and feed the outcomes back.
    Deliver,
}

// ──────────────────── collaborators ────────────────────

/// Queues jobs until the harness delivers them.
#[derive(Default)]
pub struct QueuedDispatcher {
    queue: RefCell<VecDeque<FetchJob>>,
    submitted: RefCell<Vec<FetchJob>>,
}

impl QueuedDispatcher {
    pub fn submitted(&self) -> Vec<FetchJob> {
        self.submitted.borrow().clone()
    }

    fn drain(&self) -> Vec<FetchJob> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

impl FetchDispatcher for QueuedDispatcher {
    fn submit(&self, job: FetchJob) -> Result<()> {
        self.submitted.borrow_mut().push(job.clone());
        self.queue.borrow_mut().push_back(job);
        Ok(())
    }
}

/// Keeps every presented frame as text.
#[derive(Default)]
pub struct FrameSink {
    frames: Vec<String>,
}

impl RenderSink for FrameSink {
    fn present(&mut self, view: &TreeView) {
        self.frames.push(to_text(view));
    }
}

// ──────────────────── harness ────────────────────

pub struct TreeHarness {
    session: Session<QueuedDispatcher, FrameSink>,
    catalog: Catalog,
    epoch: Instant,
    now: Instant,
    max_live_timers: usize,
}

impl Default for TreeHarness {
    fn default() -> Self {
        Self::new(sample_catalog(), ControllerSettings::default())
    }
}

impl TreeHarness {
    /// Mount a session for user `IBMUSER`.
    pub fn new(catalog: Catalog, settings: ControllerSettings) -> Self {
        let epoch = Instant::now();
        let mut session = Session::new(
            TreeState::for_user("ibmuser"),
            settings,
            QueuedDispatcher::default(),
            FrameSink::default(),
        );
        session.start(epoch);
        Self {
            session,
            catalog,
            epoch,
            now: epoch,
            max_live_timers: 0,
        }
    }

    pub fn type_path(&mut self, raw: &str) {
        self.input(UserInput::EditPath(raw.to_string()));
    }

    pub fn submit(&mut self) {
        self.input(UserInput::Submit);
    }

    pub fn refresh(&mut self) {
        self.input(UserInput::Refresh);
    }

    pub fn toggle(&mut self, id: &str) {
        self.input(UserInput::Toggle(id.to_string()));
    }

    /// Move the virtual clock forward and fire whatever became due.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.session.fire_due(self.now);
        self.observe();
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Run queued jobs against the catalog and feed outcomes back in order.
    pub fn deliver(&mut self) {
        for job in self.session.dispatcher().drain() {
            let outcome = run_job(&self.catalog, job);
            self.session
                .handle_event(SessionEvent::Fetched(outcome), self.now);
            self.observe();
        }
    }

    /// Run queued jobs but deliver the outcomes newest first.
    pub fn deliver_reversed(&mut self) {
        let mut outcomes: Vec<_> = self
            .session
            .dispatcher()
            .drain()
            .into_iter()
            .map(|job| run_job(&self.catalog, job))
            .collect();
        outcomes.reverse();
        for outcome in outcomes {
            self.session
                .handle_event(SessionEvent::Fetched(outcome), self.now);
            self.observe();
        }
    }

    pub fn run_script(&mut self, steps: &[HarnessStep]) {
        for step in steps {
            match step {
                HarnessStep::Type(raw) => self.type_path(raw),
                HarnessStep::AdvanceMs(ms) => self.advance_ms(*ms),
                HarnessStep::Submit => self.submit(),
                HarnessStep::Refresh => self.refresh(),
                HarnessStep::Toggle(id) => self.toggle(id),
                HarnessStep::Deliver => self.deliver(),
            }
        }
    }

    pub fn teardown(&mut self) {
        self.session.teardown(self.now, "harness");
    }

    // ── Queries ──

    pub fn state(&self) -> &TreeState {
        self.session.state()
    }

    pub fn session(&self) -> &Session<QueuedDispatcher, FrameSink> {
        &self.session
    }

    /// Every children path fetched so far, in submission order.
    pub fn children_fetches(&self) -> Vec<String> {
        self.session
            .dispatcher()
            .submitted()
            .into_iter()
            .filter_map(|job| match job {
                FetchJob::Children(path) => Some(path),
                FetchJob::Members(_) => None,
            })
            .collect()
    }

    pub fn member_fetches(&self) -> Vec<String> {
        self.session
            .dispatcher()
            .submitted()
            .into_iter()
            .filter_map(|job| match job {
                FetchJob::Members(child) => Some(child),
                FetchJob::Children(_) => None,
            })
            .collect()
    }

    /// Highest number of simultaneously armed timers observed.
    pub fn max_live_timers(&self) -> usize {
        self.max_live_timers
    }

    pub fn last_frame(&self) -> FrameSnapshot {
        FrameSnapshot {
            text: self.session.sink().frames.last().cloned().unwrap_or_default(),
            at: self.now - self.epoch,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.session.sink().frames.len()
    }

    fn input(&mut self, input: UserInput) {
        self.session
            .handle_event(SessionEvent::Input(input), self.now);
        self.observe();
    }

    fn observe(&mut self) {
        self.max_live_timers = self.max_live_timers.max(self.session.timers().len());
    }
}

/// Small catalog used across tree tests.
pub fn sample_catalog() -> Catalog {
    let entry = |name: &str, organization: Organization, members: &[&str]| DatasetEntry {
        name: name.to_string(),
        organization,
        members: members.iter().map(|m| (*m).to_string()).collect(),
    };
    Catalog::from_entries([
        entry("IBMUSER.CNTL", Organization::Partitioned, &["ALLOC", "COMPILE"]),
        entry("IBMUSER.DATA", Organization::Sequential, &[]),
        entry("IBMUSER.PROCLIB", Organization::Partitioned, &["ASMCL", "LINK"]),
        entry("SYS1.MACLIB", Organization::Partitioned, &["IEZBITS"]),
        entry("SYS1.PARMLIB", Organization::Partitioned, &["IEASYS00"]),
    ])
}

// ──────────────────── scenarios ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::render::NO_DATASETS_FOUND_MESSAGE;

    #[test]
    fn mount_shows_user_datasets() {
        let mut h = TreeHarness::default();
        assert_eq!(h.children_fetches(), vec!["IBMUSER"]);
        h.last_frame().assert_contains("[refreshing]");
        h.last_frame().assert_not_contains(NO_DATASETS_FOUND_MESSAGE);

        h.deliver();
        let frame = h.last_frame();
        frame.assert_contains("+ IBMUSER.CNTL (PO)");
        frame.assert_contains("  IBMUSER.DATA (PS)");
        frame.assert_not_contains("SYS1");
    }

    #[test]
    fn typing_debounces_until_quiet() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.run_script(&[
            HarnessStep::Type("s".into()),
            HarnessStep::AdvanceMs(300),
            HarnessStep::Type("sy".into()),
            HarnessStep::AdvanceMs(300),
            HarnessStep::Type("sys1".into()),
            HarnessStep::AdvanceMs(1499),
        ]);
        assert_eq!(h.children_fetches(), vec!["IBMUSER"]);
        h.advance_ms(1);
        assert_eq!(h.children_fetches(), vec!["IBMUSER", "SYS1"]);
        h.deliver();
        h.last_frame().assert_contains("SYS1.MACLIB");
        assert_eq!(h.max_live_timers(), 1);
    }

    #[test]
    fn unknown_path_shows_not_found_after_fetch() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.type_path("nobody");
        h.submit();
        h.last_frame().assert_not_contains(NO_DATASETS_FOUND_MESSAGE);
        h.deliver();
        h.last_frame().assert_contains(NO_DATASETS_FOUND_MESSAGE);
    }

    #[test]
    fn toggle_loads_members_and_refresh_reloads_them() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.toggle("IBMUSER.PROCLIB");
        h.last_frame().assert_contains("(loading)");
        h.deliver();
        h.last_frame().assert_contains("    ASMCL");

        h.refresh();
        assert_eq!(h.member_fetches(), vec!["IBMUSER.PROCLIB", "IBMUSER.PROCLIB"]);
        h.deliver();

        assert!(h.state().children["IBMUSER.PROCLIB"].expanded);
        assert!(!h.state().children["IBMUSER.CNTL"].expanded);
        let frame = h.last_frame();
        frame.assert_contains("- IBMUSER.PROCLIB (PO)");
        frame.assert_contains("    ASMCL\n    LINK");
        frame.assert_contains("+ IBMUSER.CNTL (PO)");
    }

    #[test]
    fn submit_keeps_open_branches() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.toggle("IBMUSER.CNTL");
        h.deliver();
        h.submit();
        h.deliver();
        assert_eq!(h.member_fetches(), vec!["IBMUSER.CNTL"]);
        h.last_frame().assert_contains("    ALLOC\n    COMPILE");
    }

    #[test]
    fn out_of_order_responses_keep_current_path() {
        let mut h = TreeHarness::default();
        h.type_path("sys1");
        h.submit();
        // IBMUSER (stale) and SYS1 are both outstanding; deliver SYS1 first.
        h.deliver_reversed();
        h.last_frame().assert_contains("SYS1.PARMLIB");
        h.last_frame().assert_not_contains("IBMUSER.CNTL");
        assert_eq!(h.session().store().stale_responses(), 1);
    }

    #[test]
    fn invalid_qualifier_reports_status() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.type_path("ibmuser..x");
        h.advance_ms(1500);
        h.deliver();
        let frame = h.last_frame();
        frame.assert_contains("status: [DST-2001]");
        frame.assert_contains(NO_DATASETS_FOUND_MESSAGE);
    }

    #[test]
    fn teardown_drops_pending_refresh() {
        let mut h = TreeHarness::default();
        h.deliver();
        h.type_path("sys1");
        h.teardown();
        h.advance_ms(5000);
        assert_eq!(h.children_fetches(), vec!["IBMUSER"]);
    }
}
