pub mod audio;
pub mod calendar;
pub mod db;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod timer;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use audio::ChimePlayer;
use db::Database;
use scheduler::NotificationScheduler;
use settings::SettingsStore;
use timer::PracticeTimer;

pub use db::{GoalRecord, PracticeData};
pub use models::{Category, DayEntry, Goal, PerCategory, WeeklyStats};
pub use timer::{TimerEvent, TimerSnapshot};

/// Everything a front end needs: the daily log store, user settings and the
/// timer orchestrator, wired against the production chime and notification
/// scheduler. One instance per running app.
pub struct PracticeApp {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub timer: PracticeTimer,
}

impl PracticeApp {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let db = Database::new(data_dir.join("practice-log.sqlite3"))?;
        let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

        let timer = PracticeTimer::new(
            db.clone(),
            settings.clone(),
            Arc::new(NotificationScheduler::new()),
            Arc::new(ChimePlayer::new()),
        );

        log::info!("PracticeLog opened at {}", data_dir.display());

        Ok(Self {
            db,
            settings,
            timer,
        })
    }
}

/// Initialize logging (reads RUST_LOG env var).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_toggle_and_commit_smoke() {
        let dir = tempfile::tempdir().unwrap();
        let app = PracticeApp::open(dir.path()).unwrap();

        let state = app.timer.toggle(Category::Technique).await.unwrap();
        assert!(state.running);

        // Commit immediately: a sub-minute run rounds to zero minutes but
        // still resets the session.
        let entry = app.timer.commit().await.unwrap().unwrap();
        assert_eq!(entry.total_minutes(), 0);

        let state = app.timer.get_state().await;
        assert!(!state.running);
        assert_eq!(state.total_displayed_secs(), 0);
    }
}
