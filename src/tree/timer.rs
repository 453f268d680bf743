//! Deferred-refresh timers.
//!
//! [`PendingTimer`] is the controller's single owned handle. [`TimerQueue`] is
//! the runtime side: it keeps deadlines for armed timers and hands back the
//! ones that are due. Every method takes the current [`Instant`] explicitly so
//! the queue can be driven by a virtual clock in tests.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::model::TimerId;

/// Default quiet period before a path edit triggers a refetch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// The one scheduled refresh a controller may own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    /// Path captured when the timer was armed.
    pub path: String,
}

/// Monotonic source of timer identities.
#[derive(Debug, Default)]
pub struct TimerIds {
    next: u64,
}

impl TimerIds {
    /// Allocate the next identity, starting at 1. Strictly increasing until
    /// `u64::MAX`, which then repeats instead of wrapping to an old value.
    pub fn allocate(&mut self) -> TimerId {
        self.next = self.next.saturating_add(1);
        TimerId(self.next)
    }
}

/// Deadline bookkeeping for armed timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: BTreeMap<TimerId, Instant>,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to fire `after` from `now`. Re-arming an id moves its deadline.
    pub fn schedule(&mut self, id: TimerId, now: Instant, after: Duration) {
        self.deadlines.insert(id, now + after);
    }

    /// Disarm `id`. Returns whether it was armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.deadlines.remove(&id).is_some()
    }

    /// Earliest armed deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Disarm everything.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
