//! Store handle injected into the scheduling, focus and analytics services.
//!
//! The services never reach for a global connection: handlers hand them a
//! `PgStore`, tests hand them a `MemoryStore`.

#[cfg(test)]
pub mod memory;
pub mod pg;

use crate::error_handler::ServiceError;
use crate::models::{
    CloseFocusSessionChangeset, Event, FocusSession, Habit, NewEvent, NewFocusSession,
    PomodoroSession, Task,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

pub use pg::PgStore;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The UTC calendar day `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
        TimeWindow {
            start,
            end: start + Duration::days(1),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[allow(async_fn_in_trait)]
pub trait ProductivityStore {
    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>, ServiceError>;

    async fn find_habit(&self, habit_id: Uuid) -> Result<Option<Habit>, ServiceError>;

    /// Inserts `event` and points the task's `calendar_event_id` at it, both
    /// or neither.
    async fn insert_task_event(&self, task_id: Uuid, event: NewEvent)
        -> Result<Event, ServiceError>;

    /// Inserts all events in one statement.
    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<Event>, ServiceError>;

    async fn find_open_focus_session(&self) -> Result<Option<FocusSession>, ServiceError>;

    async fn find_focus_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<FocusSession>, ServiceError>;

    /// Fails with `Conflict` when another session is still open.
    async fn insert_focus_session(
        &self,
        session: NewFocusSession,
    ) -> Result<FocusSession, ServiceError>;

    async fn close_focus_session(
        &self,
        session_id: Uuid,
        changes: CloseFocusSessionChangeset,
    ) -> Result<FocusSession, ServiceError>;

    /// Returns `None` when the task does not resolve.
    async fn increment_completed_pomodoros(
        &self,
        task_id: Uuid,
    ) -> Result<Option<Task>, ServiceError>;

    /// Returns the number of pomodoro rows touched.
    async fn attach_pomodoro_to_task(
        &self,
        pomodoro_id: Uuid,
        task_id: Uuid,
    ) -> Result<usize, ServiceError>;

    async fn tasks_due_within(&self, window: TimeWindow) -> Result<Vec<Task>, ServiceError>;

    async fn list_habits(&self) -> Result<Vec<Habit>, ServiceError>;

    async fn events_within(&self, window: TimeWindow) -> Result<Vec<Event>, ServiceError>;

    async fn pomodoros_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<PomodoroSession>, ServiceError>;

    async fn count_tasks_completed_within(&self, window: TimeWindow)
        -> Result<i64, ServiceError>;

    async fn count_tasks_due_within(&self, window: TimeWindow) -> Result<i64, ServiceError>;

    async fn count_habits_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<i64, ServiceError>;

    async fn count_habits(&self) -> Result<i64, ServiceError>;

    async fn count_pomodoros_within(&self, window: TimeWindow) -> Result<i64, ServiceError>;

    async fn sum_work_minutes_within(&self, window: TimeWindow) -> Result<i64, ServiceError>;
}
