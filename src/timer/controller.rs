use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::error;
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};

use crate::{
    audio::CompletionCue,
    calendar,
    db::Database,
    log_info,
    models::{Category, DayEntry, PerCategory},
    scheduler::CompletionScheduler,
    settings::SettingsStore,
};

use super::state::{RunState, ToggleTransition};

// Per-tick logging is off by default; flip for timer debugging.
const ENABLE_LOGS: bool = false;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: RunState,
    pub remaining_secs: PerCategory<i64>,
}

impl TimerSnapshot {
    fn of(state: &RunState) -> Self {
        Self {
            remaining_secs: PerCategory::from_fn(|c| state.remaining_display_secs(c)),
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TimerEvent {
    StateChanged { snapshot: TimerSnapshot },
    Tick { snapshot: TimerSnapshot },
    TargetReached { category: Category },
    SessionCommitted { entry: DayEntry },
}

/// Orchestrator for the practice timer. Owns the session `RunState` and
/// coordinates the reconciliation cadence, the in-context completion cue,
/// the deferred completion scheduler and the daily log store.
///
/// One instance per session; clones share state. The one-second ticker is
/// a cadence for reconciliation only, never the measurement itself.
#[derive(Clone)]
pub struct PracticeTimer {
    state: Arc<Mutex<RunState>>,
    db: Database,
    settings: Arc<SettingsStore>,
    scheduler: Arc<dyn CompletionScheduler>,
    cue: Arc<dyn CompletionCue>,
    events: broadcast::Sender<TimerEvent>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl PracticeTimer {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        scheduler: Arc<dyn CompletionScheduler>,
        cue: Arc<dyn CompletionCue>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(RunState::new())),
            db,
            settings,
            scheduler,
            cue,
            events,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    /// Current state, reconciled to now. Reading is itself a resumption
    /// point, so a pending alarm latches here too.
    pub async fn get_state(&self) -> RunState {
        let fired;
        let state = {
            let mut guard = self.state.lock().await;
            fired = guard.reconcile(Utc::now()).fired;
            guard.clone()
        };
        if let Some(category) = fired {
            self.signal_completion(category);
        }
        state
    }

    pub async fn get_snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::of(&self.get_state().await)
    }

    /// Pause the running category, or start/switch to `category`.
    pub async fn toggle(&self, category: Category) -> Result<RunState> {
        let now = Utc::now();
        let (outcome, snapshot) = {
            let mut guard = self.state.lock().await;
            let outcome = guard.toggle(category, now);
            (outcome, TimerSnapshot::of(&guard))
        };

        if let Some(latched) = outcome.fired {
            self.signal_completion(latched);
        }

        match outcome.transition {
            ToggleTransition::Paused => {
                self.scheduler.cancel();
                self.cancel_ticker().await;
            }
            ToggleTransition::Started {
                remaining_secs,
                already_alerted,
            } => {
                // Replace any prior request; if nothing may be scheduled,
                // an outstanding stale request must still die.
                if remaining_secs > 0 && !already_alerted && self.settings.notifications().enabled {
                    self.scheduler.schedule(
                        Duration::from_secs(remaining_secs),
                        category,
                        &format!(
                            "{} practice target reached ({})",
                            category.label(),
                            calendar::format_timer(*snapshot.state.target_secs.get(category) as i64),
                        ),
                    );
                } else {
                    self.scheduler.cancel();
                }
                self.spawn_ticker().await;
            }
        }

        self.emit(TimerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot.state)
    }

    /// Zero a category's elapsed time and re-arm its alarm.
    pub async fn reset(&self, category: Category) -> Result<RunState> {
        let now = Utc::now();
        let (was_running, snapshot) = {
            let mut guard = self.state.lock().await;
            let was_running = guard.reset(category, now);
            (was_running, TimerSnapshot::of(&guard))
        };

        if was_running {
            self.scheduler.cancel();
            self.cancel_ticker().await;
        }

        self.emit(TimerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot.state)
    }

    /// Set a category's target in whole minutes.
    pub async fn set_target(&self, category: Category, minutes: u32) -> Result<RunState> {
        if minutes == 0 {
            return Err(anyhow!("target must be at least one minute"));
        }

        let snapshot = {
            let mut guard = self.state.lock().await;
            guard.set_target(category, minutes);
            TimerSnapshot::of(&guard)
        };

        self.emit(TimerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot.state)
    }

    pub async fn set_note(&self, note: String) {
        let snapshot = {
            let mut guard = self.state.lock().await;
            guard.note = note;
            TimerSnapshot::of(&guard)
        };
        self.emit(TimerEvent::StateChanged { snapshot });
    }

    /// Resumption point for "the host became observable again" (window
    /// refocus, wake from sleep). Same reconcile-then-gate path as the
    /// ticker, so a long suspension fires the alarm exactly once.
    pub async fn resumed(&self) {
        let (reconciled, snapshot) = {
            let mut guard = self.state.lock().await;
            let reconciled = guard.reconcile(Utc::now());
            (reconciled, TimerSnapshot::of(&guard))
        };

        if let Some(category) = reconciled.fired {
            self.signal_completion(category);
        }
        self.emit(TimerEvent::StateChanged { snapshot });
    }

    /// Finalize the session and fold it into today's log entry. On
    /// persistence failure the session state is kept so the user can retry;
    /// returns `None` in that case.
    pub async fn commit(&self) -> Result<Option<DayEntry>> {
        let now = Utc::now();
        let day_key = calendar::today_key();

        // Hold the state lock across persistence so no operation can
        // interleave between finalize and reset.
        let mut guard = self.state.lock().await;
        guard.finalize_active(now);
        self.scheduler.cancel();
        self.cancel_ticker().await;

        let minutes = guard.session_minutes();
        let note = guard.note.clone();

        let entry = match self.db.add_session(&day_key, minutes, &note, now).await {
            Ok(entry) => entry,
            Err(err) => {
                error!("Failed to persist practice session for {day_key}: {err:#}");
                let snapshot = TimerSnapshot::of(&guard);
                drop(guard);
                self.emit(TimerEvent::StateChanged { snapshot });
                return Ok(None);
            }
        };

        guard.clear_session();
        let snapshot = TimerSnapshot::of(&guard);
        drop(guard);

        self.emit(TimerEvent::StateChanged { snapshot });
        self.emit(TimerEvent::SessionCommitted {
            entry: entry.clone(),
        });
        Ok(Some(entry))
    }

    fn signal_completion(&self, category: Category) {
        if self.settings.chime().enabled {
            self.cue.play();
        }
        self.emit(TimerEvent::TargetReached { category });
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;

                let (reconciled, snapshot) = {
                    let mut guard = state.lock().await;
                    if !guard.running {
                        break;
                    }
                    let reconciled = guard.reconcile(Utc::now());
                    (reconciled, TimerSnapshot::of(&guard))
                };

                log_info!(
                    "tick: {:?} at {}s",
                    snapshot.state.active,
                    snapshot.state.total_displayed_secs()
                );

                if let Some(category) = reconciled.fired {
                    controller.signal_completion(category);
                }
                if reconciled.changed {
                    controller.emit(TimerEvent::Tick { snapshot });
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
