use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, PerCategory};

/// Elapsed seconds for a running category: finalized base plus the whole
/// seconds since the wall-clock anchor. The wall clock keeps advancing while
/// the machine is suspended, so time spent behind a locked screen or closed
/// lid is counted; a clock rolled back behind the anchor floors at zero.
pub fn reconcile_elapsed(anchor: DateTime<Utc>, base_secs: u64, now: DateTime<Utc>) -> u64 {
    let delta = (now - anchor).num_seconds().max(0) as u64;
    base_secs.saturating_add(delta)
}

/// One-shot gate for the "target reached" signal.
pub fn alarm_should_fire(elapsed_secs: u64, target_secs: u64, already_alerted: bool) -> bool {
    elapsed_secs >= target_secs && !already_alerted
}

/// Outcome of a reconciliation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// The displayed value for the active category moved.
    pub changed: bool,
    /// The alarm latch transitioned for this category; signal once.
    pub fired: Option<Category>,
}

impl Reconciled {
    const NONE: Reconciled = Reconciled {
        changed: false,
        fired: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleTransition {
    /// The toggled category was running and is now finalized.
    Paused,
    /// The toggled category is now running from a fresh anchor.
    Started {
        remaining_secs: u64,
        already_alerted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Alarm latched during the reconciliation that precedes the transition.
    pub fired: Option<Category>,
    pub transition: ToggleTransition,
}

/// Session-lifetime timer state. Elapsed time is never tick-counted: the
/// displayed value is always recomputed from `(anchor, now)` on top of the
/// finalized `base_secs`, so missed ticks while the host loop is suspended
/// cost nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// The category holding the live anchor, if any. At most one.
    pub active: Option<Category>,
    pub running: bool,
    /// Last-synced observable elapsed seconds per category.
    pub displayed_secs: PerCategory<u64>,
    pub target_secs: PerCategory<u64>,
    /// One-shot alarm latch per category, per uncommitted run.
    pub alerted: PerCategory<bool>,
    pub note: String,
    /// Seconds finalized by earlier running windows; combines with `anchor`
    /// for the active category to form the true elapsed duration.
    #[serde(skip)]
    pub base_secs: PerCategory<u64>,
    /// Wall-clock start of the current running window.
    #[serde(skip)]
    pub anchor: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            active: None,
            running: false,
            displayed_secs: PerCategory::fill(0),
            target_secs: PerCategory::from_fn(|c| c.default_target_secs()),
            alerted: PerCategory::fill(false),
            note: String::new(),
            base_secs: PerCategory::fill(0),
            anchor: None,
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True elapsed seconds for a category at `now`.
    pub fn elapsed_secs(&self, category: Category, now: DateTime<Utc>) -> u64 {
        match self.anchor {
            Some(anchor) if self.running && self.active == Some(category) => {
                reconcile_elapsed(anchor, *self.base_secs.get(category), now)
            }
            _ => *self.base_secs.get(category),
        }
    }

    /// Seconds left to the target as last displayed; negative once past it.
    pub fn remaining_display_secs(&self, category: Category) -> i64 {
        *self.target_secs.get(category) as i64 - *self.displayed_secs.get(category) as i64
    }

    pub fn total_displayed_secs(&self) -> u64 {
        Category::ALL
            .iter()
            .map(|c| *self.displayed_secs.get(*c))
            .sum()
    }

    pub fn total_target_secs(&self) -> u64 {
        Category::ALL.iter().map(|c| *self.target_secs.get(*c)).sum()
    }

    /// Recompute the active category's displayed value from the anchor and
    /// run the alarm gate. Every resumption point (tick, foreground regain,
    /// state read, toggle) funnels through here, so the alarm can neither be
    /// missed across a suspension nor fired twice.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Reconciled {
        let (category, anchor) = match (self.active, self.anchor) {
            (Some(category), Some(anchor)) if self.running => (category, anchor),
            _ => return Reconciled::NONE,
        };

        let elapsed = reconcile_elapsed(anchor, *self.base_secs.get(category), now);
        let changed = elapsed != *self.displayed_secs.get(category);
        self.displayed_secs.set(category, elapsed);

        let fired = if alarm_should_fire(
            elapsed,
            *self.target_secs.get(category),
            *self.alerted.get(category),
        ) {
            self.alerted.set(category, true);
            Some(category)
        } else {
            None
        };

        Reconciled { changed, fired }
    }

    /// Fold the anchor delta into `base_secs` and stop counting. No-op when
    /// nothing is running.
    pub fn finalize_active(&mut self, now: DateTime<Utc>) {
        let (category, anchor) = match (self.active, self.anchor) {
            (Some(category), Some(anchor)) if self.running => (category, anchor),
            _ => return,
        };

        let elapsed = reconcile_elapsed(anchor, *self.base_secs.get(category), now);
        self.base_secs.set(category, elapsed);
        self.displayed_secs.set(category, elapsed);
        self.active = None;
        self.anchor = None;
        self.running = false;
    }

    /// Pause the category if it is the one running, otherwise finalize any
    /// other running category and start this one from a fresh anchor.
    /// Switching is pause-then-resume; two categories never count at once.
    pub fn toggle(&mut self, category: Category, now: DateTime<Utc>) -> ToggleOutcome {
        let fired = self.reconcile(now).fired;

        if self.running && self.active == Some(category) {
            self.finalize_active(now);
            return ToggleOutcome {
                fired,
                transition: ToggleTransition::Paused,
            };
        }

        if self.running {
            self.finalize_active(now);
        }

        self.active = Some(category);
        self.anchor = Some(now);
        self.running = true;

        let remaining_secs = self
            .target_secs
            .get(category)
            .saturating_sub(*self.base_secs.get(category));

        ToggleOutcome {
            fired,
            transition: ToggleTransition::Started {
                remaining_secs,
                already_alerted: *self.alerted.get(category),
            },
        }
    }

    /// Zero the category and re-arm its alarm latch. Returns whether the
    /// category was the running one (the caller must then drop its deferred
    /// completion request).
    pub fn reset(&mut self, category: Category, now: DateTime<Utc>) -> bool {
        let was_running = self.running && self.active == Some(category);
        if was_running {
            self.finalize_active(now);
        }

        self.base_secs.set(category, 0);
        self.displayed_secs.set(category, 0);
        self.alerted.set(category, false);
        was_running
    }

    /// Set the target from whole minutes. The latch is re-armed only for a
    /// fresh category (nothing finalized yet); a latch that already fired
    /// mid-session is deliberately left in place.
    pub fn set_target(&mut self, category: Category, minutes: u32) {
        self.target_secs.set(category, minutes as u64 * 60);
        if *self.base_secs.get(category) == 0 {
            self.alerted.set(category, false);
        }
    }

    /// Accumulated whole minutes per category, rounded half-up. Call after
    /// `finalize_active` so `base_secs` holds the full session.
    pub fn session_minutes(&self) -> PerCategory<u32> {
        PerCategory::from_fn(|c| ((*self.base_secs.get(c) + 30) / 60) as u32)
    }

    /// Reset everything except targets after a successful commit.
    pub fn clear_session(&mut self) {
        self.active = None;
        self.running = false;
        self.anchor = None;
        self.base_secs = PerCategory::fill(0);
        self.displayed_secs = PerCategory::fill(0);
        self.alerted = PerCategory::fill(false);
        self.note.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(origin: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
        origin + TimeDelta::seconds(secs as i64)
    }

    #[test]
    fn reconcile_elapsed_floors_to_whole_seconds() {
        let t0 = Utc::now();
        let now = t0 + TimeDelta::milliseconds(2500);
        assert_eq!(reconcile_elapsed(t0, 0, now), 2);
        assert_eq!(reconcile_elapsed(t0, 7, now), 9);
        assert_eq!(reconcile_elapsed(t0, 0, t0), 0);
    }

    #[test]
    fn reconcile_elapsed_is_monotonic() {
        let t0 = Utc::now();
        let mut last = 0;
        for ms in [0i64, 999, 1000, 1001, 4_200, 86_400_000] {
            let elapsed = reconcile_elapsed(t0, 3, t0 + TimeDelta::milliseconds(ms));
            assert!(elapsed >= last);
            last = elapsed;
        }
    }

    #[test]
    fn clock_rollback_floors_at_the_finalized_base() {
        let t0 = Utc::now();
        // A wall clock stepped behind the anchor never yields less than base.
        assert_eq!(reconcile_elapsed(t0, 0, t0 - TimeDelta::seconds(40)), 0);
        assert_eq!(reconcile_elapsed(t0, 5, t0 - TimeDelta::hours(2)), 5);

        let mut state = RunState::new();
        state.toggle(Category::Technique, t0);
        let outcome = state.reconcile(t0 - TimeDelta::seconds(40));
        assert_eq!(outcome.fired, None);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 0);
    }

    #[test]
    fn reconcile_is_idempotent_for_a_fixed_now() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.toggle(Category::Technique, t0);

        let first = state.reconcile(at(t0, 4));
        assert!(first.changed);
        let second = state.reconcile(at(t0, 4));
        assert!(!second.changed);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 4);
    }

    #[test]
    fn at_most_one_category_runs() {
        let t0 = Utc::now();
        let mut state = RunState::new();

        state.toggle(Category::Technique, t0);
        state.toggle(Category::Etude, at(t0, 3));
        state.toggle(Category::Repertoire, at(t0, 5));
        state.toggle(Category::Repertoire, at(t0, 9));
        state.toggle(Category::Etude, at(t0, 12));

        assert!(state.running);
        assert_eq!(state.active, Some(Category::Etude));
        // Only the active category may diverge from its base.
        for category in Category::ALL {
            if category != Category::Etude {
                assert_eq!(
                    state.displayed_secs.get(category),
                    state.base_secs.get(category)
                );
            }
        }
    }

    #[test]
    fn alarm_fires_exactly_once_per_run() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Technique, 1); // 60s
        state.toggle(Category::Technique, t0);

        assert_eq!(state.reconcile(at(t0, 30)).fired, None);

        let hit = state.reconcile(at(t0, 60));
        assert_eq!(hit.fired, Some(Category::Technique));
        assert!(*state.alerted.get(Category::Technique));

        // Still running past the target: no duplicate.
        assert_eq!(state.reconcile(at(t0, 95)).fired, None);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 95);
    }

    #[test]
    fn alarm_latches_on_a_resumption_after_long_suspension() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Etude, 5);
        state.toggle(Category::Etude, t0);

        // The machine slept for two hours with no ticks; the wall-clock
        // anchor counts the whole window and the first reconciliation
        // latches exactly once.
        let outcome = state.reconcile(at(t0, 7200));
        assert_eq!(outcome.fired, Some(Category::Etude));
        assert_eq!(*state.displayed_secs.get(Category::Etude), 7200);
        assert_eq!(state.reconcile(at(t0, 7201)).fired, None);
    }

    #[test]
    fn pausing_past_the_target_latches_on_the_way_out() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Technique, 1);
        state.toggle(Category::Technique, t0);

        let outcome = state.toggle(Category::Technique, at(t0, 90));
        assert_eq!(outcome.fired, Some(Category::Technique));
        assert_eq!(outcome.transition, ToggleTransition::Paused);
        assert!(!state.running);
    }

    #[test]
    fn switching_finalizes_the_prior_category() {
        let t0 = Utc::now();
        let mut state = RunState::new();

        state.toggle(Category::Technique, t0);
        let outcome = state.toggle(Category::Etude, at(t0, 10));

        assert_eq!(*state.base_secs.get(Category::Technique), 10);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 10);
        assert_eq!(state.active, Some(Category::Etude));
        assert!(state.running);
        assert!(matches!(
            outcome.transition,
            ToggleTransition::Started {
                remaining_secs: 1200,
                already_alerted: false,
            }
        ));

        // The new run counts from its own anchor.
        state.reconcile(at(t0, 14));
        assert_eq!(*state.displayed_secs.get(Category::Etude), 4);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 10);
    }

    #[test]
    fn resuming_schedules_the_true_remaining_time() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Repertoire, 10); // 600s

        state.toggle(Category::Repertoire, t0);
        state.toggle(Category::Repertoire, at(t0, 45)); // pause at 45s
        let outcome = state.toggle(Category::Repertoire, at(t0, 100));

        assert_eq!(
            outcome.transition,
            ToggleTransition::Started {
                remaining_secs: 555,
                already_alerted: false,
            }
        );
    }

    #[test]
    fn reset_clears_the_latch_and_permits_a_fresh_alarm() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Technique, 1);
        state.toggle(Category::Technique, t0);
        state.reconcile(at(t0, 60));
        assert!(*state.alerted.get(Category::Technique));

        let was_running = state.reset(Category::Technique, at(t0, 70));
        assert!(was_running);
        assert_eq!(*state.base_secs.get(Category::Technique), 0);
        assert_eq!(*state.displayed_secs.get(Category::Technique), 0);
        assert!(!*state.alerted.get(Category::Technique));
        assert!(!state.running);

        // Same target, fresh run: the alarm may fire again.
        state.toggle(Category::Technique, at(t0, 100));
        assert_eq!(
            state.reconcile(at(t0, 160)).fired,
            Some(Category::Technique)
        );
    }

    #[test]
    fn set_target_rearms_only_fresh_categories() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Etude, 1);
        state.toggle(Category::Etude, t0);
        state.toggle(Category::Etude, at(t0, 60)); // latches and finalizes
        assert!(*state.alerted.get(Category::Etude));

        // Raising the target mid-session leaves the stale latch in place.
        state.set_target(Category::Etude, 30);
        assert!(*state.alerted.get(Category::Etude));

        // On a fresh category the latch is re-armed.
        state.set_target(Category::Technique, 5);
        assert!(!*state.alerted.get(Category::Technique));
    }

    #[test]
    fn session_minutes_round_half_up() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.toggle(Category::Technique, t0);
        state.toggle(Category::Etude, at(t0, 7)); // 7s -> 0min
        state.toggle(Category::Etude, at(t0, 137)); // 130s -> 2min
        state.toggle(Category::Repertoire, at(t0, 137));
        state.finalize_active(at(t0, 227)); // 90s -> 2min

        let minutes = state.session_minutes();
        assert_eq!(minutes.technique, 0);
        assert_eq!(minutes.etude, 2);
        assert_eq!(minutes.repertoire, 2);
    }

    #[test]
    fn clear_session_keeps_targets() {
        let t0 = Utc::now();
        let mut state = RunState::new();
        state.set_target(Category::Technique, 25);
        state.note = "arpeggios".into();
        state.toggle(Category::Technique, t0);
        state.finalize_active(at(t0, 10));

        state.clear_session();
        assert_eq!(*state.target_secs.get(Category::Technique), 1500);
        assert_eq!(*state.base_secs.get(Category::Technique), 0);
        assert!(state.note.is_empty());
        assert!(!state.running);
    }
}
