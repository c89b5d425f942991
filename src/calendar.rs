//! Calendar key derivation and timer formatting. Pure functions; the log
//! store is addressed exclusively through these keys.

use chrono::{Datelike, Days, Local, NaiveDate};

use crate::models::{Category, GoalCycle};

/// Stable per-day key, `YYYY-MM-DD` in local time.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` month key.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// ISO-8601 week key, `YYYY-Wnn`. Uses the ISO week-year so keys near
/// year boundaries never collide.
pub fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn today_key() -> String {
    day_key(today())
}

/// The seven dates of the Monday-started week containing `date`.
pub fn week_dates(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = date - Days::new(date.weekday().num_days_from_monday() as u64);
    std::array::from_fn(|i| monday + Days::new(i as u64))
}

/// The goal-store key for a category's current period: week key for the
/// weekly disciplines, month key for repertoire.
pub fn goal_period_key(category: Category, date: NaiveDate) -> String {
    match category.goal_cycle() {
        GoalCycle::Weekly => week_key(date),
        GoalCycle::Monthly => month_key(date),
    }
}

/// `MM:SS`, with a leading minus once a countdown has gone past its target.
pub fn format_timer(secs: i64) -> String {
    let abs = secs.unsigned_abs();
    let sign = if secs < 0 { "-" } else { "" };
    format!("{}{:02}:{:02}", sign, abs / 60, abs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_and_month_keys_are_zero_padded() {
        assert_eq!(day_key(date(2026, 3, 7)), "2026-03-07");
        assert_eq!(month_key(date(2026, 3, 7)), "2026-03");
    }

    #[test]
    fn week_key_uses_iso_week_year() {
        assert_eq!(week_key(date(2026, 1, 5)), "2026-W02");
        // Jan 1 2027 falls in week 53 of ISO year 2026.
        assert_eq!(week_key(date(2027, 1, 1)), "2026-W53");
    }

    #[test]
    fn week_dates_start_on_monday() {
        let days = week_dates(date(2026, 3, 4)); // a Wednesday
        assert_eq!(days[0], date(2026, 3, 2));
        assert_eq!(days[6], date(2026, 3, 8));
        assert!(days.contains(&date(2026, 3, 4)));
    }

    #[test]
    fn goal_periods_follow_the_category_cycle() {
        let d = date(2026, 3, 4);
        assert_eq!(goal_period_key(Category::Technique, d), "2026-W10");
        assert_eq!(goal_period_key(Category::Etude, d), "2026-W10");
        assert_eq!(goal_period_key(Category::Repertoire, d), "2026-03");
    }

    #[test]
    fn timer_formatting() {
        assert_eq!(format_timer(0), "00:00");
        assert_eq!(format_timer(75), "01:15");
        assert_eq!(format_timer(-42), "-00:42");
        assert_eq!(format_timer(3600), "60:00");
    }
}
