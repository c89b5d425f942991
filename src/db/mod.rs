use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

mod migrations;

use crate::calendar;
use crate::models::{Category, DayEntry, Goal, PerCategory, WeeklyStats};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("minute count {value} out of range"))
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<DayEntry> {
    Ok(DayEntry {
        day_key: row.get::<_, String>(0)?,
        minutes: PerCategory {
            technique: to_u32(row.get::<_, i64>(1)?)?,
            etude: to_u32(row.get::<_, i64>(2)?)?,
            repertoire: to_u32(row.get::<_, i64>(3)?)?,
        },
        note: row.get::<_, String>(4)?,
        updated_at: parse_datetime(&row.get::<_, String>(5)?)?,
    })
}

const SELECT_ENTRY: &str = "SELECT day_key, technique_minutes, etude_minutes, repertoire_minutes, note, updated_at
     FROM day_logs";

fn get_entry(conn: &Connection, day_key: &str) -> Result<Option<DayEntry>> {
    let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE day_key = ?1"))?;
    let mut rows = stmt.query(params![day_key])?;
    match rows.next()? {
        Some(row) => Ok(Some(entry_from_row(row)?)),
        None => Ok(None),
    }
}

fn put_entry(conn: &Connection, entry: &DayEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO day_logs (day_key, technique_minutes, etude_minutes, repertoire_minutes, note, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(day_key) DO UPDATE SET
             technique_minutes = excluded.technique_minutes,
             etude_minutes = excluded.etude_minutes,
             repertoire_minutes = excluded.repertoire_minutes,
             note = excluded.note,
             updated_at = excluded.updated_at",
        params![
            entry.day_key,
            entry.minutes.technique as i64,
            entry.minutes.etude as i64,
            entry.minutes.repertoire as i64,
            entry.note,
            entry.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("failed to upsert day log for {}", entry.day_key))?;
    Ok(())
}

/// One goal row as exported: the composite key plus its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoalRecord {
    pub category: Category,
    pub period_key: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Full snapshot of the store (every day log and goal), serializable to
/// JSON for backup and transfer between machines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PracticeData {
    pub entries: Vec<DayEntry>,
    pub goals: Vec<GoalRecord>,
}

/// The daily practice log and goal store. A single worker thread owns the
/// SQLite connection; callers post closures over a channel and await a
/// oneshot reply, so the store is usable from async code without a pool.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("practice-log-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn get_day_entry(&self, day_key: &str) -> Result<Option<DayEntry>> {
        let day_key = day_key.to_string();
        self.execute(move |conn| get_entry(conn, &day_key)).await
    }

    /// Replace a day's entry wholesale (manual log editing).
    pub async fn upsert_day_entry(&self, entry: DayEntry) -> Result<()> {
        self.execute(move |conn| put_entry(conn, &entry)).await
    }

    /// Fold a committed session into the day's entry: minutes are additive,
    /// the session note is appended with a " | " separator. Returns the
    /// resulting entry.
    pub async fn add_session(
        &self,
        day_key: &str,
        minutes: PerCategory<u32>,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<DayEntry> {
        let day_key = day_key.to_string();
        let note = note.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut entry =
                get_entry(&tx, &day_key)?.unwrap_or_else(|| DayEntry::empty(day_key.as_str(), now));

            let summed = PerCategory::from_fn(|c| entry.minutes.get(c).saturating_add(*minutes.get(c)));
            entry.minutes = summed;
            if !note.is_empty() {
                if entry.note.is_empty() {
                    entry.note = note.clone();
                } else {
                    entry.note = format!("{} | {}", entry.note, note);
                }
            }
            entry.updated_at = now;

            put_entry(&tx, &entry)?;
            tx.commit().context("failed to commit session entry")?;
            Ok(entry)
        })
        .await
    }

    /// Entries with `from_key <= day_key <= to_key`. Day keys sort
    /// lexicographically in date order.
    pub async fn entries_in_range(&self, from_key: &str, to_key: &str) -> Result<Vec<DayEntry>> {
        let from_key = from_key.to_string();
        let to_key = to_key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ENTRY} WHERE day_key >= ?1 AND day_key <= ?2 ORDER BY day_key"
            ))?;
            let mut rows = stmt.query(params![from_key, to_key])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(entry_from_row(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// Per-category minute sums and practiced-day count over the
    /// Monday-started week containing `date`.
    pub async fn weekly_stats(&self, date: NaiveDate) -> Result<WeeklyStats> {
        let keys: Vec<String> = calendar::week_dates(date)
            .iter()
            .map(|d| calendar::day_key(*d))
            .collect();

        self.execute(move |conn| {
            let mut minutes = PerCategory::fill(0u32);
            let mut days = 0;
            for key in &keys {
                if let Some(entry) = get_entry(conn, key)? {
                    let summed =
                        PerCategory::from_fn(|c| minutes.get(c).saturating_add(*entry.minutes.get(c)));
                    minutes = summed;
                    if entry.total_minutes() > 0 {
                        days += 1;
                    }
                }
            }
            Ok(WeeklyStats { minutes, days })
        })
        .await
    }

    /// Consecutive days with nonzero practice, counting backward from
    /// `today` inclusive.
    pub async fn streak(&self, today: NaiveDate) -> Result<u32> {
        self.execute(move |conn| {
            let mut streak = 0;
            let mut day = today;
            loop {
                match get_entry(conn, &calendar::day_key(day))? {
                    Some(entry) if entry.total_minutes() > 0 => {
                        streak += 1;
                        day = day
                            .pred_opt()
                            .ok_or_else(|| anyhow!("date underflow while computing streak"))?;
                    }
                    _ => break,
                }
            }
            Ok(streak)
        })
        .await
    }

    /// Set (or overwrite) the goal for a category's current period.
    /// A freshly set goal is not completed.
    pub async fn set_goal(
        &self,
        category: Category,
        period_key: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let period_key = period_key.to_string();
        let title = title.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO goals (category, period_key, title, completed, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)
                 ON CONFLICT(category, period_key) DO UPDATE SET
                     title = excluded.title,
                     completed = 0,
                     created_at = excluded.created_at",
                params![category.as_str(), period_key, title, now.to_rfc3339()],
            )
            .with_context(|| "failed to upsert goal")?;
            Ok(())
        })
        .await
    }

    pub async fn get_goal(&self, category: Category, period_key: &str) -> Result<Option<Goal>> {
        let period_key = period_key.to_string();
        self.execute(move |conn| {
            let goal = conn
                .query_row(
                    "SELECT title, completed FROM goals WHERE category = ?1 AND period_key = ?2",
                    params![category.as_str(), period_key],
                    |row| {
                        Ok(Goal {
                            title: row.get(0)?,
                            completed: row.get::<_, i64>(1)? != 0,
                        })
                    },
                )
                .optional()?;
            Ok(goal)
        })
        .await
    }

    /// Flip a goal's completed flag; returns the updated goal, or `None`
    /// when no goal exists for the period.
    pub async fn toggle_goal(&self, category: Category, period_key: &str) -> Result<Option<Goal>> {
        let period_key = period_key.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE goals SET completed = 1 - completed
                 WHERE category = ?1 AND period_key = ?2",
                params![category.as_str(), period_key],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let goal = conn.query_row(
                "SELECT title, completed FROM goals WHERE category = ?1 AND period_key = ?2",
                params![category.as_str(), period_key],
                |row| {
                    Ok(Goal {
                        title: row.get(0)?,
                        completed: row.get::<_, i64>(1)? != 0,
                    })
                },
            )?;
            Ok(Some(goal))
        })
        .await
    }

    /// Goal history for a category, newest period first.
    pub async fn list_goals(&self, category: Category) -> Result<Vec<(String, Goal)>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT period_key, title, completed FROM goals
                 WHERE category = ?1 ORDER BY period_key DESC",
            )?;
            let mut rows = stmt.query(params![category.as_str()])?;
            let mut goals = Vec::new();
            while let Some(row) = rows.next()? {
                goals.push((
                    row.get::<_, String>(0)?,
                    Goal {
                        title: row.get(1)?,
                        completed: row.get::<_, i64>(2)? != 0,
                    },
                ));
            }
            Ok(goals)
        })
        .await
    }

    /// Snapshot everything in the store.
    pub async fn export_data(&self) -> Result<PracticeData> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} ORDER BY day_key"))?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(entry_from_row(row)?);
            }

            let mut stmt = conn.prepare(
                "SELECT category, period_key, title, completed, created_at FROM goals
                 ORDER BY category, period_key",
            )?;
            let mut rows = stmt.query([])?;
            let mut goals = Vec::new();
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                let category = Category::from_str(&raw)
                    .ok_or_else(|| anyhow!("unknown category '{raw}' in goals table"))?;
                goals.push(GoalRecord {
                    category,
                    period_key: row.get(1)?,
                    title: row.get(2)?,
                    completed: row.get::<_, i64>(3)? != 0,
                    created_at: parse_datetime(&row.get::<_, String>(4)?)?,
                });
            }

            Ok(PracticeData { entries, goals })
        })
        .await
    }

    /// Restore a snapshot. Replaces the entire store in one transaction;
    /// existing logs and goals are gone afterwards.
    pub async fn import_data(&self, data: PracticeData) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM day_logs", [])?;
            tx.execute("DELETE FROM goals", [])?;

            for entry in &data.entries {
                put_entry(&tx, entry)?;
            }
            for goal in &data.goals {
                tx.execute(
                    "INSERT INTO goals (category, period_key, title, completed, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        goal.category.as_str(),
                        goal.period_key,
                        goal.title,
                        goal.completed as i64,
                        goal.created_at.to_rfc3339(),
                    ],
                )?;
            }

            tx.commit().context("failed to commit imported snapshot")?;
            Ok(())
        })
        .await
    }
}
