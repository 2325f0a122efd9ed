use super::{ProductivityStore, TimeWindow};
use crate::error_handler::ServiceError;
use crate::models::{
    CloseFocusSessionChangeset, Event, FocusSession, Habit, HabitFrequency, NewEvent,
    NewFocusSession, PomodoroPhase, PomodoroSession, Task, DEFAULT_PRIORITY,
};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    tasks: Vec<Task>,
    habits: Vec<Habit>,
    events: Vec<Event>,
    pomodoros: Vec<PomodoroSession>,
    focus_sessions: Vec<FocusSession>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Test double holding every table in memory. Reads and writes can be made
/// to fail to exercise the error paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(state: &State) -> Result<(), ServiceError> {
        if state.fail_writes {
            return Err(ServiceError::DatabaseError(
                "A database operation failed.".to_string(),
            ));
        }
        Ok(())
    }

    fn check_readable(state: &State) -> Result<(), ServiceError> {
        if state.fail_reads {
            return Err(ServiceError::DatabaseError(
                "A database operation failed.".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn add_task(&self, title: &str) -> Task {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            completed: false,
            due_date: None,
            priority: DEFAULT_PRIORITY.to_string(),
            description: None,
            calendar_event_id: None,
            estimated_pomodoros: 0,
            completed_pomodoros: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.put_task(task.clone());
        task
    }

    /// Inserts or replaces a task row verbatim.
    pub fn put_task(&self, task: Task) {
        let mut state = self.lock();
        state.tasks.retain(|existing| existing.id != task.id);
        state.tasks.push(task);
    }

    pub fn add_habit(&self, name: &str, frequency: HabitFrequency) -> Habit {
        let now = Utc::now();
        let habit = Habit {
            id: Uuid::new_v4(),
            name: name.to_string(),
            frequency,
            completed_today: false,
            streak: 0,
            color: None,
            last_completed: None,
            target_time: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.put_habit(habit.clone());
        habit
    }

    pub fn put_habit(&self, habit: Habit) {
        let mut state = self.lock();
        state.habits.retain(|existing| existing.id != habit.id);
        state.habits.push(habit);
    }

    pub fn add_pomodoro(
        &self,
        phase: PomodoroPhase,
        duration: i32,
        completed_at: DateTime<Utc>,
    ) -> PomodoroSession {
        let session = PomodoroSession {
            id: Uuid::new_v4(),
            phase,
            duration,
            completed_at,
            task_id: None,
            notes: None,
            productive: true,
            created_at: completed_at,
            updated_at: completed_at,
            deleted_at: None,
        };
        self.lock().pomodoros.push(session.clone());
        session
    }

    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == task_id).cloned()
    }

    pub fn pomodoro(&self, pomodoro_id: Uuid) -> Option<PomodoroSession> {
        self.lock()
            .pomodoros
            .iter()
            .find(|p| p.id == pomodoro_id)
            .cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn focus_sessions(&self) -> Vec<FocusSession> {
        self.lock().focus_sessions.clone()
    }

    fn materialize(event: NewEvent) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            title: event.title,
            description: event.description,
            event_date: event.event_date,
            priority: event.priority,
            all_day: event.all_day,
            duration: event.duration,
            source: event.source,
            created_at: now,
            updated_at: now,
        }
    }
}

fn live<'a, T: 'a>(
    rows: &'a [T],
    deleted_at: impl Fn(&T) -> Option<DateTime<Utc>> + 'a,
) -> impl Iterator<Item = &'a T> + 'a {
    rows.iter().filter(move |row| deleted_at(row).is_none())
}

impl ProductivityStore for MemoryStore {
    async fn find_task(&self, task_id: Uuid) -> Result<Option<Task>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let found = live(&state.tasks, |t| t.deleted_at)
            .find(|t| t.id == task_id)
            .cloned();
        Ok(found)
    }

    async fn find_habit(&self, habit_id: Uuid) -> Result<Option<Habit>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let found = live(&state.habits, |h| h.deleted_at)
            .find(|h| h.id == habit_id)
            .cloned();
        Ok(found)
    }

    async fn insert_task_event(
        &self,
        task_id: Uuid,
        event: NewEvent,
    ) -> Result<Event, ServiceError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.deleted_at.is_none())
            .ok_or_else(|| ServiceError::NotFound(format!("Task with id {} not found", task_id)))?;

        let created = Self::materialize(event);
        task.calendar_event_id = Some(created.id);
        task.updated_at = Utc::now();
        state.events.push(created.clone());
        Ok(created)
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<Event>, ServiceError> {
        let mut state = self.lock();
        if events.is_empty() {
            return Ok(Vec::new());
        }
        Self::check_writable(&state)?;

        let created: Vec<Event> = events.into_iter().map(Self::materialize).collect();
        state.events.extend(created.iter().cloned());
        Ok(created)
    }

    async fn find_open_focus_session(&self) -> Result<Option<FocusSession>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let found = live(&state.focus_sessions, |s| s.deleted_at)
            .find(|s| s.is_open())
            .cloned();
        Ok(found)
    }

    async fn find_focus_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<FocusSession>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let found = live(&state.focus_sessions, |s| s.deleted_at)
            .find(|s| s.id == session_id)
            .cloned();
        Ok(found)
    }

    async fn insert_focus_session(
        &self,
        session: NewFocusSession,
    ) -> Result<FocusSession, ServiceError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;

        // Same guarantee as the partial unique index in Postgres.
        if live(&state.focus_sessions, |s| s.deleted_at).any(|s| s.is_open()) {
            return Err(ServiceError::Conflict(
                "Another focus session is already active".to_string(),
            ));
        }

        let now = Utc::now();
        let created = FocusSession {
            id: Uuid::new_v4(),
            task_id: session.task_id,
            start_time: session.start_time,
            end_time: None,
            planned_duration: session.planned_duration,
            actual_duration: None,
            notes: None,
            completed: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.focus_sessions.push(created.clone());
        Ok(created)
    }

    async fn close_focus_session(
        &self,
        session_id: Uuid,
        changes: CloseFocusSessionChangeset,
    ) -> Result<FocusSession, ServiceError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;

        let session = state
            .focus_sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.deleted_at.is_none())
            .ok_or_else(|| {
                ServiceError::NotFound("The requested record was not found.".to_string())
            })?;

        session.end_time = changes.end_time;
        session.actual_duration = changes.actual_duration;
        session.notes = changes.notes;
        session.completed = changes.completed;
        session.updated_at = changes.updated_at;
        Ok(session.clone())
    }

    async fn increment_completed_pomodoros(
        &self,
        task_id: Uuid,
    ) -> Result<Option<Task>, ServiceError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;

        let updated = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.deleted_at.is_none())
            .map(|task| {
                task.completed_pomodoros += 1;
                task.updated_at = Utc::now();
                task.clone()
            });
        Ok(updated)
    }

    async fn attach_pomodoro_to_task(
        &self,
        pomodoro_id: Uuid,
        task_id: Uuid,
    ) -> Result<usize, ServiceError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;

        let mut touched = 0;
        for pomodoro in state
            .pomodoros
            .iter_mut()
            .filter(|p| p.id == pomodoro_id && p.deleted_at.is_none())
        {
            pomodoro.task_id = Some(task_id);
            touched += 1;
        }
        Ok(touched)
    }

    async fn tasks_due_within(&self, window: TimeWindow) -> Result<Vec<Task>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.tasks, |t| t.deleted_at)
            .filter(|t| t.due_date.is_some_and(|due| window.contains(due)))
            .cloned()
            .collect())
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.habits, |h| h.deleted_at).cloned().collect())
    }

    async fn events_within(&self, window: TimeWindow) -> Result<Vec<Event>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| window.contains(e.event_date))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.event_date);
        Ok(events)
    }

    async fn pomodoros_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<PomodoroSession>, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        let mut sessions: Vec<PomodoroSession> = live(&state.pomodoros, |p| p.deleted_at)
            .filter(|p| window.contains(p.completed_at))
            .cloned()
            .collect();
        sessions.sort_by_key(|p| std::cmp::Reverse(p.completed_at));
        Ok(sessions)
    }

    async fn count_tasks_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<i64, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.tasks, |t| t.deleted_at)
            .filter(|t| t.completed && window.contains(t.updated_at))
            .count() as i64)
    }

    async fn count_tasks_due_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        Ok(self.tasks_due_within(window).await?.len() as i64)
    }

    async fn count_habits_completed_within(
        &self,
        window: TimeWindow,
    ) -> Result<i64, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.habits, |h| h.deleted_at)
            .filter(|h| h.completed_today && window.contains(h.updated_at))
            .count() as i64)
    }

    async fn count_habits(&self) -> Result<i64, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.habits, |h| h.deleted_at).count() as i64)
    }

    async fn count_pomodoros_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        Ok(self.pomodoros_completed_within(window).await?.len() as i64)
    }

    async fn sum_work_minutes_within(&self, window: TimeWindow) -> Result<i64, ServiceError> {
        let state = self.lock();
        Self::check_readable(&state)?;
        Ok(live(&state.pomodoros, |p| p.deleted_at)
            .filter(|p| p.phase == PomodoroPhase::Work && window.contains(p.completed_at))
            .map(|p| i64::from(p.duration))
            .sum())
    }
}
