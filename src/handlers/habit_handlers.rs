use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    parse_target_time, CreateHabitPayload, Habit, NewHabit, UpdateHabitChangeset,
    UpdateHabitPayload,
};
use crate::schema::habits::{self, dsl::*};
use actix_web::{delete, get, post, put, web, HttpResponse, Result as ActixResult};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;
use uuid::Uuid;

fn validate_name(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest("name cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

// Stored in canonical HH:MM form once it parses.
fn validate_target_time(raw: Option<String>) -> Result<Option<String>, ServiceError> {
    match raw {
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => parse_target_time(&value)
            .map(|time| Some(time.format("%H:%M").to_string()))
            .map_err(ServiceError::BadRequest),
        None => Ok(None),
    }
}

fn validate_streak(value: Option<i32>) -> Result<(), ServiceError> {
    match value {
        Some(count) if count < 0 => Err(ServiceError::BadRequest(
            "streak cannot be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

// === POST /habits ===
#[post("")]
pub async fn create_habit_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<CreateHabitPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    validate_streak(payload.streak)?;

    let new_habit_data = NewHabit {
        name: validate_name(&payload.name)?,
        frequency: payload.frequency.unwrap_or_default(),
        completed_today: payload.completed_today.unwrap_or(false),
        streak: payload.streak.unwrap_or(0),
        color: payload.color,
        last_completed: payload.last_completed,
        target_time: validate_target_time(payload.target_time)?,
    };

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let created_habit = diesel::insert_into(habits::table)
        .values(&new_habit_data)
        .returning(Habit::as_returning())
        .get_result::<Habit>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!(
        "Habit created: {} ({}, {})",
        created_habit.id,
        created_habit.name,
        created_habit.frequency
    );
    Ok(HttpResponse::Ok().json(created_habit))
}

// === GET /habits ===
#[get("")]
pub async fn list_habits_handler(
    pool: web::Data<DbPool>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let habit_list = habits
        .filter(deleted_at.is_null())
        .order(created_at.asc())
        .select(Habit::as_select())
        .load::<Habit>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(habit_list))
}

// === GET /habits/{habit_id_path} ===
#[get("/{habit_id_path}")]
pub async fn get_habit_handler(
    pool: web::Data<DbPool>,
    habit_id_path: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let habit_to_find_id = habit_id_path.into_inner();

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let habit_option = habits
        .filter(id.eq(habit_to_find_id))
        .filter(deleted_at.is_null())
        .select(Habit::as_select())
        .first::<Habit>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match habit_option {
        Some(habit) => Ok(HttpResponse::Ok().json(habit)),
        None => Err(ServiceError::NotFound(format!(
            "Habit with id {} not found",
            habit_to_find_id
        ))),
    }
}

// === PUT /habits/{habit_id_path} ===
#[put("/{habit_id_path}")]
pub async fn update_habit_handler(
    pool: web::Data<DbPool>,
    habit_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateHabitPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let habit_to_update_id = habit_id_path.into_inner();
    let payload = payload.into_inner();
    log::info!(
        "Updating habit {} with payload: {:?}",
        habit_to_update_id,
        payload
    );

    validate_streak(payload.streak)?;

    let habit_changes = UpdateHabitChangeset {
        name: payload.name.as_deref().map(validate_name).transpose()?,
        frequency: payload.frequency,
        completed_today: payload.completed_today,
        streak: payload.streak,
        color: payload.color,
        last_completed: payload.last_completed,
        target_time: payload.target_time.map(validate_target_time).transpose()?,
        updated_at: Some(Utc::now()),
    };

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let updated_habit = diesel::update(
        habits
            .filter(id.eq(habit_to_update_id))
            .filter(deleted_at.is_null()),
    )
    .set(&habit_changes)
    .returning(Habit::as_returning())
    .get_result::<Habit>(&mut conn)
    .await
    .map_err(|db_err| match db_err {
        diesel::result::Error::NotFound => ServiceError::NotFound(format!(
            "Habit with id {} not found for update",
            habit_to_update_id
        )),
        _ => ServiceError::from(db_err),
    })?;

    Ok(HttpResponse::Ok().json(updated_habit))
}

// === DELETE /habits/{habit_id_path} ===
#[delete("/{habit_id_path}")]
pub async fn delete_habit_handler(
    pool: web::Data<DbPool>,
    habit_id_path: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let habit_to_delete_id = habit_id_path.into_inner();

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let now = Utc::now();
    let num_deleted = diesel::update(
        habits
            .filter(id.eq(habit_to_delete_id))
            .filter(deleted_at.is_null()),
    )
    .set((deleted_at.eq(Some(now)), updated_at.eq(now)))
    .execute(&mut conn)
    .await
    .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        log::info!("Habit {} soft-deleted", habit_to_delete_id);
        Ok(HttpResponse::Ok().json(json!({ "message": "Habit deleted" })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Habit with id {} not found",
            habit_to_delete_id
        )))
    }
}
