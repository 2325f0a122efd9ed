//! Focus session lifecycle: a session is open until it gets an end time,
//! and only one may be open at a time.

use crate::error_handler::ServiceError;
use crate::models::{
    CloseFocusSessionChangeset, FocusSession, FocusSessionDetails, NewFocusSession,
};
use crate::store::ProductivityStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct FocusCompletion {
    pub notes: Option<String>,
    pub completed: bool,
    pub pomodoro_id: Option<Uuid>,
}

/// Whole minutes between `start` and `end`, truncated.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    (end - start).num_minutes().clamp(0, i64::from(i32::MAX)) as i32
}

pub async fn start_focus_session<S: ProductivityStore>(
    store: &S,
    task_id: Uuid,
    planned_duration: i32,
    now: DateTime<Utc>,
) -> Result<FocusSessionDetails, ServiceError> {
    if planned_duration < 0 {
        return Err(ServiceError::BadRequest(
            "planned_duration cannot be negative".to_string(),
        ));
    }

    let task = store
        .find_task(task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Task not found".to_string()))?;

    if let Some(open) = store.find_open_focus_session().await? {
        log::info!(
            "Refusing to start a focus session for task {}: session {} is still open",
            task_id,
            open.id
        );
        return Err(ServiceError::Conflict(
            "Another focus session is already active".to_string(),
        ));
    }

    let session = store
        .insert_focus_session(NewFocusSession {
            task_id,
            start_time: now,
            planned_duration,
        })
        .await?;

    log::info!("Started focus session {} on task {}", session.id, task_id);
    Ok(FocusSessionDetails {
        session,
        task: Some(task),
    })
}

/// Closes the session at `now`. Completing an already closed session closes
/// it again and overwrites its duration.
pub async fn complete_focus_session<S: ProductivityStore>(
    store: &S,
    session_id: Uuid,
    completion: FocusCompletion,
    now: DateTime<Utc>,
) -> Result<FocusSessionDetails, ServiceError> {
    let session = store
        .find_focus_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Focus session not found".to_string()))?;

    if !session.is_open() {
        log::info!("Focus session {} was already closed, closing again", session.id);
    }

    let changes = CloseFocusSessionChangeset {
        end_time: Some(now),
        actual_duration: Some(elapsed_minutes(session.start_time, now)),
        notes: completion.notes,
        completed: completion.completed,
        updated_at: now,
    };
    let closed = store.close_focus_session(session.id, changes).await?;

    if completion.completed {
        if let Some(pomodoro_id) = completion.pomodoro_id {
            credit_pomodoro(store, &closed, pomodoro_id).await;
        }
    }

    log::info!(
        "Completed focus session {} after {} minutes",
        closed.id,
        closed.actual_duration.unwrap_or_default()
    );

    // The session is closed either way; a failed task read only drops the embed.
    let task = store.find_task(closed.task_id).await.unwrap_or_else(|e| {
        log::warn!("Could not load task {} for focus session {}: {}", closed.task_id, closed.id, e);
        None
    });
    Ok(FocusSessionDetails {
        session: closed,
        task,
    })
}

// Best effort: the session is already closed, so failures here are only logged.
async fn credit_pomodoro<S: ProductivityStore>(
    store: &S,
    session: &FocusSession,
    pomodoro_id: Uuid,
) {
    let task = match store.increment_completed_pomodoros(session.task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            log::warn!(
                "Task {} of focus session {} is gone, pomodoro not credited",
                session.task_id,
                session.id
            );
            return;
        }
        Err(e) => {
            log::warn!(
                "Could not credit pomodoro to task {}: {}",
                session.task_id,
                e
            );
            return;
        }
    };

    match store.attach_pomodoro_to_task(pomodoro_id, task.id).await {
        Ok(0) => log::warn!("Pomodoro session {} not found, not attached", pomodoro_id),
        Ok(_) => log::debug!("Attached pomodoro {} to task {}", pomodoro_id, task.id),
        Err(e) => log::warn!(
            "Could not attach pomodoro {} to task {}: {}",
            pomodoro_id,
            task.id,
            e
        ),
    }
}

pub async fn active_focus_session<S: ProductivityStore>(
    store: &S,
) -> Result<Option<FocusSessionDetails>, ServiceError> {
    let Some(session) = store.find_open_focus_session().await? else {
        return Ok(None);
    };
    let task = store.find_task(session.task_id).await?;
    Ok(Some(FocusSessionDetails { session, task }))
}
