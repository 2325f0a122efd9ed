use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{CreatePomodoroPayload, NewPomodoroSession, PomodoroSession, PomodoroStats};
use crate::schema::{
    pomodoro_sessions::{self, dsl::*},
    tasks,
};
use crate::store::TimeWindow;
use actix_web::{delete, get, post, web, HttpResponse, Result as ActixResult};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;
use uuid::Uuid;

const RECENT_SESSIONS_LIMIT: i64 = 50;

fn new_pomodoro_session(
    payload: CreatePomodoroPayload,
    now: DateTime<Utc>,
) -> Result<NewPomodoroSession, ServiceError> {
    if payload.duration < 0 {
        return Err(ServiceError::BadRequest(
            "duration cannot be negative".to_string(),
        ));
    }

    Ok(NewPomodoroSession {
        phase: payload.phase,
        duration: payload.duration,
        completed_at: payload.completed_at.unwrap_or(now),
        task_id: payload.task_id,
        notes: payload.notes,
        productive: payload.productive.unwrap_or(true),
    })
}

// === POST /pomodoro/sessions ===
#[post("/sessions")]
pub async fn create_pomodoro_session_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<CreatePomodoroPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Recording pomodoro session with payload: {:?}", payload.0);
    let new_session_data = new_pomodoro_session(payload.into_inner(), Utc::now())?;

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    if let Some(linked_task) = new_session_data.task_id {
        tasks::table
            .filter(tasks::id.eq(linked_task))
            .filter(tasks::deleted_at.is_null())
            .select(tasks::id)
            .first::<Uuid>(&mut conn)
            .await
            .map_err(|db_err| match db_err {
                diesel::result::Error::NotFound => {
                    ServiceError::NotFound(format!("Task with id {} not found", linked_task))
                }
                _ => ServiceError::from(db_err),
            })?;
    }

    let created_session = diesel::insert_into(pomodoro_sessions::table)
        .values(&new_session_data)
        .returning(PomodoroSession::as_returning())
        .get_result::<PomodoroSession>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!(
        "Pomodoro session {} recorded ({}, {} min)",
        created_session.id,
        created_session.phase,
        created_session.duration
    );
    Ok(HttpResponse::Ok().json(created_session))
}

// === GET /pomodoro/stats ===
#[get("/stats")]
pub async fn pomodoro_stats_handler(
    pool: web::Data<DbPool>,
) -> ActixResult<HttpResponse, ServiceError> {
    let today = TimeWindow::day(Utc::now().date_naive());

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let completed_sessions = pomodoro_sessions
        .filter(deleted_at.is_null())
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let total_minutes = pomodoro_sessions
        .filter(deleted_at.is_null())
        .select(diesel::dsl::sum(duration))
        .get_result::<Option<i64>>(&mut conn)
        .await
        .map_err(ServiceError::from)?
        .unwrap_or(0);

    let today_sessions = pomodoro_sessions
        .filter(deleted_at.is_null())
        .filter(completed_at.ge(today.start))
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(PomodoroStats {
        completed_sessions,
        total_minutes,
        today_sessions,
    }))
}

// === GET /pomodoro/sessions ===
#[get("/sessions")]
pub async fn list_pomodoro_sessions_handler(
    pool: web::Data<DbPool>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let sessions = pomodoro_sessions
        .filter(deleted_at.is_null())
        .order(completed_at.desc())
        .limit(RECENT_SESSIONS_LIMIT)
        .select(PomodoroSession::as_select())
        .load::<PomodoroSession>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(sessions))
}

// === DELETE /pomodoro/sessions ===
#[delete("/sessions")]
pub async fn clear_pomodoro_sessions_handler(
    pool: web::Data<DbPool>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let now = Utc::now();
    let num_deleted = diesel::update(pomodoro_sessions.filter(deleted_at.is_null()))
        .set((deleted_at.eq(Some(now)), updated_at.eq(now)))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!("Cleared {} pomodoro sessions", num_deleted);
    Ok(HttpResponse::Ok().json(json!({
        "message": "All sessions cleared",
        "deleted": num_deleted
    })))
}
