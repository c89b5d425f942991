use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PerCategory;

/// One calendar day's persisted practice log. Minutes are additive across
/// sessions committed on the same day; the note accumulates with a " | "
/// separator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    pub day_key: String,
    pub minutes: PerCategory<u32>,
    pub note: String,
    pub updated_at: DateTime<Utc>,
}

impl DayEntry {
    pub fn empty(day_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            day_key: day_key.into(),
            minutes: PerCategory::fill(0),
            note: String::new(),
            updated_at: now,
        }
    }

    pub fn total_minutes(&self) -> u32 {
        self.minutes.technique + self.minutes.etude + self.minutes.repertoire
    }
}

/// Aggregate over the Monday-started week containing a reference date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub minutes: PerCategory<u32>,
    /// Days in the week with any practice logged.
    pub days: u32,
}
