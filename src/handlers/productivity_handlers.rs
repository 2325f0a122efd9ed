// Focus sessions, scheduling and analytics. These handlers stay thin and
// delegate to the services over the shared store.
use crate::error_handler::ServiceError;
use crate::models::{
    parse_flexible_datetime, CompleteFocusPayload, ScheduleHabitPayload, ScheduleTaskPayload,
    StartFocusPayload,
};
use crate::services::{analytics, focus, scheduling};
use crate::store::PgStore;
use actix_web::{get, post, put, web, HttpResponse, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

#[derive(serde::Deserialize, Debug)]
pub struct WeeklyAnalyticsQuery {
    pub date: Option<String>,
}

fn reference_time(
    query: &WeeklyAnalyticsQuery,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ServiceError> {
    match query.date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            parse_flexible_datetime(raw).map_err(ServiceError::BadRequest)
        }
        _ => Ok(now),
    }
}

// === GET /productivity/dashboard ===
#[get("/dashboard")]
pub async fn dashboard_handler(
    store: web::Data<PgStore>,
) -> ActixResult<HttpResponse, ServiceError> {
    let snapshot = analytics::dashboard_snapshot(store.get_ref(), Utc::now()).await;
    Ok(HttpResponse::Ok().json(snapshot))
}

// === POST /productivity/focus/start ===
#[post("/focus/start")]
pub async fn start_focus_handler(
    store: web::Data<PgStore>,
    payload: web::Json<StartFocusPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Starting focus session with payload: {:?}", payload.0);
    let payload = payload.into_inner();

    let details = focus::start_focus_session(
        store.get_ref(),
        payload.task_id,
        payload.planned_duration,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(details))
}

// === PUT /productivity/focus/{session_id_path}/complete ===
#[put("/focus/{session_id_path}/complete")]
pub async fn complete_focus_handler(
    store: web::Data<PgStore>,
    session_id_path: web::Path<Uuid>,
    payload: web::Json<CompleteFocusPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let session_to_complete_id = session_id_path.into_inner();
    let payload = payload.into_inner();
    log::info!(
        "Completing focus session {} with payload: {:?}",
        session_to_complete_id,
        payload
    );

    let completion = focus::FocusCompletion {
        notes: payload.notes,
        completed: payload.completed,
        pomodoro_id: payload.pomodoro_id,
    };

    let session = focus::complete_focus_session(
        store.get_ref(),
        session_to_complete_id,
        completion,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(session))
}

// === GET /productivity/focus/active ===
#[get("/focus/active")]
pub async fn active_focus_handler(
    store: web::Data<PgStore>,
) -> ActixResult<HttpResponse, ServiceError> {
    let details = focus::active_focus_session(store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(json!({ "active_session": details })))
}

// === POST /productivity/schedule/task ===
#[post("/schedule/task")]
pub async fn schedule_task_handler(
    store: web::Data<PgStore>,
    payload: web::Json<ScheduleTaskPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let payload = payload.into_inner();

    let event = scheduling::schedule_task_event(
        store.get_ref(),
        payload.task_id,
        payload.event_date,
        payload.duration,
    )
    .await?;

    Ok(HttpResponse::Ok().json(event))
}

// === POST /productivity/schedule/habit ===
#[post("/schedule/habit")]
pub async fn schedule_habit_handler(
    store: web::Data<PgStore>,
    payload: web::Json<ScheduleHabitPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let payload = payload.into_inner();

    let scheduled = scheduling::schedule_habit_events(
        store.get_ref(),
        payload.habit_id,
        payload.start_date,
        payload.days,
    )
    .await?;

    Ok(HttpResponse::Ok().json(scheduled))
}

// === GET /productivity/analytics/weekly?date=... ===
#[get("/analytics/weekly")]
pub async fn weekly_analytics_handler(
    store: web::Data<PgStore>,
    query_params: web::Query<WeeklyAnalyticsQuery>,
) -> ActixResult<HttpResponse, ServiceError> {
    let reference = reference_time(&query_params, Utc::now())?;
    let report = analytics::weekly_analytics(store.get_ref(), reference).await?;
    Ok(HttpResponse::Ok().json(report))
}
