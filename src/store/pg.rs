use super::{ProductivityStore, TimeWindow};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    CloseFocusSessionChangeset, Event, EventRecord, FocusSession, Habit, NewEvent,
    NewEventRecord, NewFocusSession, PomodoroPhase, PomodoroSession, Task,
};
use crate::schema::{calendar_events, focus_sessions, habits, pomodoro_sessions, tasks};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

/// Postgres-backed store sharing the application's connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }
}

impl ProductivityStore for PgStore {
    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let task = tasks::table
            .filter(tasks::id.eq(task_id))
            .filter(tasks::deleted_at.is_null())
            .select(Task::as_select())
            .first::<Task>(&mut conn)
            .await
            .optional()?;

        Ok(task)
    }

    async fn find_habit(&self, habit_id: Uuid) -> Result<Option<Habit>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let habit = habits::table
            .filter(habits::id.eq(habit_id))
            .filter(habits::deleted_at.is_null())
            .select(Habit::as_select())
            .first::<Habit>(&mut conn)
            .await
            .optional()?;

        Ok(habit)
    }

    async fn insert_task_event(
        &self,
        task_id: Uuid,
        event: NewEvent,
    ) -> Result<Event, ServiceError> {
        let mut conn = self.pool.get().await?;
        let record = NewEventRecord::from(event);

        conn.transaction::<Event, ServiceError, _>(|conn| {
            async move {
                let created = diesel::insert_into(calendar_events::table)
                    .values(&record)
                    .returning(EventRecord::as_returning())
                    .get_result::<EventRecord>(conn)
                    .await?;

                let linked = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id))
                        .filter(tasks::deleted_at.is_null()),
                )
                .set((
                    tasks::calendar_event_id.eq(Some(created.id)),
                    tasks::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;

                // Rolls the event back with the transaction.
                if linked == 0 {
                    return Err(ServiceError::NotFound(format!(
                        "Task with id {} not found",
                        task_id
                    )));
                }

                Ok(Event::from(created))
            }
            .scope_boxed()
        })
        .await
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<Event>, ServiceError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<NewEventRecord> = events.into_iter().map(NewEventRecord::from).collect();
        let mut conn = self.pool.get().await?;

        let created = diesel::insert_into(calendar_events::table)
            .values(&records)
            .returning(EventRecord::as_returning())
            .get_results::<EventRecord>(&mut conn)
            .await?;

        Ok(created.into_iter().map(Event::from).collect())
    }

    async fn find_open_focus_session(&self) -> Result<Option<FocusSession>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let session = focus_sessions::table
            .filter(focus_sessions::end_time.is_null())
            .filter(focus_sessions::deleted_at.is_null())
            .order(focus_sessions::start_time.desc())
            .select(FocusSession::as_select())
            .first::<FocusSession>(&mut conn)
            .await
            .optional()?;

        Ok(session)
    }

    async fn find_focus_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<FocusSession>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let session = focus_sessions::table
            .filter(focus_sessions::id.eq(session_id))
            .filter(focus_sessions::deleted_at.is_null())
            .select(FocusSession::as_select())
            .first::<FocusSession>(&mut conn)
            .await
            .optional()?;

        Ok(session)
    }

    async fn insert_focus_session(
        &self,
        session: NewFocusSession,
    ) -> Result<FocusSession, ServiceError> {
        let mut conn = self.pool.get().await?;

        // The partial unique index `focus_sessions_single_open` catches the
        // race this check cannot.
        conn.transaction::<FocusSession, ServiceError, _>(|conn| {
            async move {
                let open_id = focus_sessions::table
                    .filter(focus_sessions::end_time.is_null())
                    .filter(focus_sessions::deleted_at.is_null())
                    .select(focus_sessions::id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;

                if let Some(open_id) = open_id {
                    log::info!("Focus session {} is still open", open_id);
                    return Err(ServiceError::Conflict(
                        "Another focus session is already active".to_string(),
                    ));
                }

                let created = diesel::insert_into(focus_sessions::table)
                    .values(&session)
                    .returning(FocusSession::as_returning())
                    .get_result::<FocusSession>(conn)
                    .await?;

                Ok(created)
            }
            .scope_boxed()
        })
        .await
    }

    async fn close_focus_session(
        &self,
        session_id: Uuid,
        changes: CloseFocusSessionChangeset,
    ) -> Result<FocusSession, ServiceError> {
        let mut conn = self.pool.get().await?;

        let closed = diesel::update(
            focus_sessions::table
                .filter(focus_sessions::id.eq(session_id))
                .filter(focus_sessions::deleted_at.is_null()),
        )
        .set(&changes)
        .returning(FocusSession::as_returning())
        .get_result::<FocusSession>(&mut conn)
        .await?;

        Ok(closed)
    }

    async fn increment_completed_pomodoros(
        &self,
        task_id: Uuid,
    ) -> Result<Option<Task>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let task = diesel::update(
            tasks::table
                .filter(tasks::id.eq(task_id))
                .filter(tasks::deleted_at.is_null()),
        )
        .set((
            tasks::completed_pomodoros.eq(tasks::completed_pomodoros + 1),
            tasks::updated_at.eq(Utc::now()),
        ))
        .returning(Task::as_returning())
        .get_result::<Task>(&mut conn)
        .await
        .optional()?;

        Ok(task)
    }

    async fn attach_pomodoro_to_task(
        &self,
        pomodoro_id: Uuid,
        task_id: Uuid,
    ) -> Result<usize, ServiceError> {
        let mut conn = self.pool.get().await?;

        let touched = diesel::update(
            pomodoro_sessions::table
                .filter(pomodoro_sessions::id.eq(pomodoro_id))
                .filter(pomodoro_sessions::deleted_at.is_null()),
        )
        .set((
            pomodoro_sessions::task_id.eq(Some(task_id)),
            pomodoro_sessions::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        Ok(touched)
    }

    async fn tasks_due_within(&self, window: TimeWindow) -> Result<Vec<Task>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let due = tasks::table
            .filter(tasks::deleted_at.is_null())
            .filter(tasks::due_date.ge(window.start))
            .filter(tasks::due_date.lt(window.end))
            .order(tasks::due_date.asc())
            .select(Task::as_select())
            .load::<Task>(&mut conn)
            .await?;

        Ok(due)
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let all = habits::table
            .filter(habits::deleted_at.is_null())
            .order(habits::created_at.asc())
            .select(Habit::as_select())
            .load::<Habit>(&mut conn)
            .await?;

        Ok(all)
    }

    async fn events_within(&self, window: TimeWindow) -> Result<Vec<Event>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let records = calendar_events::table
            .filter(calendar_events::deleted_at.is_null())
            .filter(calendar_events::event_date.ge(window.start))
            .filter(calendar_events::event_date.lt(window.end))
            .order(calendar_events::event_date.asc())
            .select(EventRecord::as_select())
            .load::<EventRecord>(&mut conn)
            .await?;

        Ok(records.into_iter().map(Event::from).collect())
    }

    async fn pomodoros_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<PomodoroSession>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let sessions = pomodoro_sessions::table
            .filter(pomodoro_sessions::deleted_at.is_null())
            .filter(pomodoro_sessions::completed_at.ge(window.start))
            .filter(pomodoro_sessions::completed_at.lt(window.end))
            .order(pomodoro_sessions::completed_at.desc())
            .select(PomodoroSession::as_select())
            .load::<PomodoroSession>(&mut conn)
            .await?;

        Ok(sessions)
    }

    async fn count_tasks_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let count = tasks::table
            .filter(tasks::deleted_at.is_null())
            .filter(tasks::completed.eq(true))
            .filter(tasks::updated_at.ge(window.start))
            .filter(tasks::updated_at.lt(window.end))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn count_tasks_due_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let count = tasks::table
            .filter(tasks::deleted_at.is_null())
            .filter(tasks::due_date.ge(window.start))
            .filter(tasks::due_date.lt(window.end))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn count_habits_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let count = habits::table
            .filter(habits::deleted_at.is_null())
            .filter(habits::completed_today.eq(true))
            .filter(habits::updated_at.ge(window.start))
            .filter(habits::updated_at.lt(window.end))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn count_habits(&self) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let count = habits::table
            .filter(habits::deleted_at.is_null())
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn count_pomodoros_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let count = pomodoro_sessions::table
            .filter(pomodoro_sessions::deleted_at.is_null())
            .filter(pomodoro_sessions::completed_at.ge(window.start))
            .filter(pomodoro_sessions::completed_at.lt(window.end))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn sum_work_minutes_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get().await?;

        let total = pomodoro_sessions::table
            .filter(pomodoro_sessions::deleted_at.is_null())
            .filter(pomodoro_sessions::phase.eq(PomodoroPhase::Work))
            .filter(pomodoro_sessions::completed_at.ge(window.start))
            .filter(pomodoro_sessions::completed_at.lt(window.end))
            .select(diesel::dsl::sum(pomodoro_sessions::duration))
            .get_result::<Option<i64>>(&mut conn)
            .await?;

        Ok(total.unwrap_or(0))
    }
}
