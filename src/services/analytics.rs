//! Dashboard snapshot and weekly activity report.

use crate::error_handler::ServiceError;
use crate::models::{Event, FocusSessionDetails, Habit, PomodoroSession, Task};
use crate::services::focus;
use crate::store::{ProductivityStore, TimeWindow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub today_tasks: Vec<Task>,
    pub today_habits: Vec<Habit>,
    pub today_events: Vec<Event>,
    pub today_pomodoros: Vec<PomodoroSession>,
    pub active_focus: Option<FocusSessionDetails>,
    pub date: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub day_name: String,
    pub completed_tasks: i64,
    pub total_tasks: i64,
    pub completed_habits: i64,
    pub total_habits: i64,
    pub pomodoro_sessions: i64,
    pub productive_minutes: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub daily_stats: Vec<DailyStats>,
}

/// Sunday on or before `reference`'s UTC date.
pub fn week_start(reference: DateTime<Utc>) -> NaiveDate {
    let day = reference.date_naive();
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

fn or_empty<T: Default>(part: &str, result: Result<T, ServiceError>) -> T {
    result.unwrap_or_else(|e| {
        log::warn!("Dashboard {} unavailable, returning empty: {}", part, e);
        T::default()
    })
}

/// Everything relevant to the UTC day containing `now`. Each part is read
/// independently; a failing read yields an empty part instead of an error.
pub async fn dashboard_snapshot<S: ProductivityStore>(
    store: &S,
    now: DateTime<Utc>,
) -> DashboardSnapshot {
    let today = TimeWindow::day(now.date_naive());

    let (tasks, habits, events, pomodoros, active) = futures_util::join!(
        store.tasks_due_within(today),
        store.list_habits(),
        store.events_within(today),
        store.pomodoros_completed_within(today),
        focus::active_focus_session(store),
    );

    DashboardSnapshot {
        today_tasks: or_empty("tasks", tasks),
        // Habits are not day-scoped.
        today_habits: or_empty("habits", habits),
        today_events: or_empty("events", events),
        today_pomodoros: or_empty("pomodoros", pomodoros),
        active_focus: or_empty("active focus session", active),
        date: today.start,
    }
}

pub async fn weekly_analytics<S: ProductivityStore>(
    store: &S,
    reference: DateTime<Utc>,
) -> Result<WeeklyReport, ServiceError> {
    let start = week_start(reference);
    let mut daily_stats = Vec::with_capacity(7);

    for day in start.iter_days().take(7) {
        let window = TimeWindow::day(day);
        daily_stats.push(DailyStats {
            date: day,
            day_name: day.format("%A").to_string(),
            completed_tasks: store.count_tasks_completed_within(window).await?,
            total_tasks: store.count_tasks_due_within(window).await?,
            completed_habits: store.count_habits_completed_within(window).await?,
            total_habits: store.count_habits().await?,
            pomodoro_sessions: store.count_pomodoros_within(window).await?,
            productive_minutes: store.sum_work_minutes_within(window).await?,
        });
    }

    log::debug!("Weekly analytics computed for week starting {}", start);
    Ok(WeeklyReport {
        week_start: start,
        daily_stats,
    })
}
