//! Property-based tests for refresh controller invariants.
//!
//! Random edit/submit/refresh/toggle/clock sequences are replayed through the
//! headless harness, checking timer ownership, debounce coalescing, and that
//! late responses never leak into the current path.

use std::time::Duration;

use proptest::prelude::*;

use super::catalog::DatasetSource;
use super::controller::{ControllerSettings, RefreshController, update};
use super::model::{ControllerCmd, ControllerMsg, TreeState};
use super::test_harness::{HarnessStep, TreeHarness, sample_catalog};

const DEBOUNCE_MS: u64 = 1500;

// ──────────────────── strategies ────────────────────

fn arb_path() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("ibmuser".to_string()),
        Just("ibmuser.cntl".to_string()),
        Just("ibmuser.*".to_string()),
        Just("sys1".to_string()),
        Just("sys1.**".to_string()),
        Just("nobody".to_string()),
        "[a-z]{1,8}(\\.[a-z]{1,8}){0,2}",
    ]
}

fn arb_step() -> impl Strategy<Value = HarnessStep> {
    prop_oneof![
        4 => arb_path().prop_map(HarnessStep::Type),
        3 => (0u64..3000).prop_map(HarnessStep::AdvanceMs),
        1 => Just(HarnessStep::Submit),
        1 => Just(HarnessStep::Refresh),
        1 => prop_oneof![
            Just("IBMUSER.CNTL".to_string()),
            Just("IBMUSER.PROCLIB".to_string()),
            Just("SYS1.MACLIB".to_string()),
        ]
        .prop_map(HarnessStep::Toggle),
        2 => Just(HarnessStep::Deliver),
    ]
}

fn normalized(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Edits spaced closer than the debounce delay coalesce into one fetch
    /// of the last path.
    #[test]
    fn rapid_edits_coalesce_to_last_path(
        bases in prop::collection::vec(arb_path(), 1..12),
        gaps in prop::collection::vec(0u64..DEBOUNCE_MS, 12),
    ) {
        // Suffix each edit so every one moves the path.
        let paths: Vec<String> = bases
            .iter()
            .enumerate()
            .map(|(i, base)| format!("{base}{i}"))
            .collect();

        let mut h = TreeHarness::default();
        h.deliver();
        for (path, gap) in paths.iter().zip(&gaps) {
            h.type_path(path);
            h.advance_ms(*gap);
        }
        prop_assert_eq!(h.children_fetches().len(), 1);

        h.advance_ms(DEBOUNCE_MS);
        let last = normalized(&paths[paths.len() - 1]);
        prop_assert_eq!(h.children_fetches(), vec!["IBMUSER".to_string(), last]);
    }

    /// No sequence of operations ever arms more than one timer.
    #[test]
    fn at_most_one_timer_is_live(
        steps in prop::collection::vec(arb_step(), 1..60)
    ) {
        let mut h = TreeHarness::default();
        h.run_script(&steps);
        prop_assert!(h.max_live_timers() <= 1);
        prop_assert_eq!(
            h.session().timers().len(),
            usize::from(h.session().controller().pending().is_some())
        );
    }

    /// Once the clock settles, loaded children belong to the current path.
    #[test]
    fn children_always_match_current_path(
        steps in prop::collection::vec(arb_step(), 1..60)
    ) {
        let mut h = TreeHarness::default();
        h.run_script(&steps);
        // Let any pending refresh fire, then drain every response.
        h.advance_ms(DEBOUNCE_MS);
        h.deliver();

        let catalog = sample_catalog();
        let path = h.state().path.clone();
        if let Ok(expected) = catalog.list_children(&path) {
            for id in h.state().children.keys() {
                prop_assert!(
                    expected.iter().any(|(name, _)| name == id),
                    "{id} is not under {path}"
                );
            }
        } else {
            prop_assert!(h.state().children.is_empty());
        }
        prop_assert!(!h.state().is_fetching);
    }

    /// After teardown, nothing the clock does triggers a fetch.
    #[test]
    fn teardown_is_final(
        steps in prop::collection::vec(arb_step(), 0..30),
        later in 0u64..10_000,
    ) {
        let mut h = TreeHarness::default();
        h.run_script(&steps);
        h.teardown();
        let fetched = h.children_fetches().len();
        h.advance_ms(later);
        h.type_path("sys1");
        h.advance_ms(DEBOUNCE_MS);
        prop_assert_eq!(h.children_fetches().len(), fetched);
    }

    /// Pure controller: every ScheduleRefresh is preceded by a cancel of the
    /// previous live timer.
    #[test]
    fn reschedule_always_cancels_previous(
        paths in prop::collection::vec(arb_path(), 1..20)
    ) {
        let mut ctl = RefreshController::new(ControllerSettings::default());
        let mut state = TreeState::for_user("ibmuser");
        state.path = "IBMUSER".to_string();
        let mut live = None;
        for raw in paths {
            let previous = state.path.clone();
            state.path = normalized(&raw);
            let cmds = update(&mut ctl, &state, ControllerMsg::PathChanged { previous }).into_vec();
            for cmd in cmds {
                match cmd {
                    ControllerCmd::CancelRefresh(id) => {
                        prop_assert_eq!(Some(id), live.take());
                    }
                    ControllerCmd::ScheduleRefresh { timer, after } => {
                        prop_assert!(live.is_none(), "schedule without cancel");
                        prop_assert_eq!(after, Duration::from_millis(DEBOUNCE_MS));
                        live = Some(timer);
                    }
                    other => prop_assert!(false, "unexpected {other:?}"),
                }
            }
        }
    }
}
