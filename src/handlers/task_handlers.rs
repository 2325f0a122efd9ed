// tickr-backend/src/handlers/task_handlers.rs
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    CreateTaskPayload, NewTask, Task, UpdateTaskChangeset, UpdateTaskPayload, DEFAULT_PRIORITY,
};
use crate::schema::tasks;
use crate::schema::tasks::dsl::*;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;
use uuid::Uuid;

fn validate_title(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_pomodoro_count(field: &str, value: Option<i32>) -> Result<(), ServiceError> {
    match value {
        Some(count) if count < 0 => Err(ServiceError::BadRequest(format!(
            "{} cannot be negative",
            field
        ))),
        _ => Ok(()),
    }
}

#[post("")]
pub async fn create_task_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<CreateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    validate_pomodoro_count("estimated_pomodoros", payload.estimated_pomodoros)?;
    validate_pomodoro_count("completed_pomodoros", payload.completed_pomodoros)?;

    let new_task_data = NewTask {
        title: validate_title(&payload.title)?,
        completed: payload.completed.unwrap_or(false),
        due_date: payload.due_date,
        priority: payload
            .priority
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
        description: payload.description,
        estimated_pomodoros: payload.estimated_pomodoros.unwrap_or(0),
        completed_pomodoros: payload.completed_pomodoros.unwrap_or(0),
    };

    let mut conn = pool.get().await?;

    let task = diesel::insert_into(tasks::table)
        .values(&new_task_data)
        .returning(Task::as_returning())
        .get_result::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!("Task created: {} ({})", task.id, task.title);
    Ok(HttpResponse::Ok().json(task))
}

#[get("")]
pub async fn list_tasks_handler(pool: web::Data<DbPool>) -> Result<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;

    let task_list = tasks
        .filter(deleted_at.is_null())
        .order(created_at.desc())
        .select(Task::as_select())
        .load::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(task_list))
}

#[get("/{task_id_path}")]
pub async fn get_task_handler(
    pool: web::Data<DbPool>,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_find_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;

    let task_option = tasks
        .filter(id.eq(task_to_find_id))
        .filter(deleted_at.is_null())
        .select(Task::as_select())
        .first::<Task>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match task_option {
        Some(task) => Ok(HttpResponse::Ok().json(task)),
        None => Err(ServiceError::NotFound(format!(
            "Task with id {} not found",
            task_to_find_id
        ))),
    }
}

#[put("/{task_id_path}")]
pub async fn update_task_handler(
    pool: web::Data<DbPool>,
    task_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateTaskPayload>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_update_id = task_id_path.into_inner();
    let payload = payload.into_inner();
    log::info!("Updating task {} with payload: {:?}", task_to_update_id, payload);

    validate_pomodoro_count("estimated_pomodoros", payload.estimated_pomodoros)?;
    validate_pomodoro_count("completed_pomodoros", payload.completed_pomodoros)?;

    let task_changes = UpdateTaskChangeset {
        title: payload.title.as_deref().map(validate_title).transpose()?,
        completed: payload.completed,
        due_date: payload.due_date,
        priority: payload.priority,
        description: payload.description,
        calendar_event_id: payload.calendar_event_id,
        estimated_pomodoros: payload.estimated_pomodoros,
        completed_pomodoros: payload.completed_pomodoros,
        updated_at: Some(Utc::now()),
    };

    let mut conn = pool.get().await?;

    let updated_task = diesel::update(
        tasks
            .filter(id.eq(task_to_update_id))
            .filter(deleted_at.is_null()),
    )
    .set(&task_changes)
    .returning(Task::as_returning())
    .get_result::<Task>(&mut conn)
    .await
    .map_err(|db_err| match db_err {
        diesel::result::Error::NotFound => ServiceError::NotFound(format!(
            "Task with id {} not found for update",
            task_to_update_id
        )),
        _ => ServiceError::from(db_err),
    })?;

    Ok(HttpResponse::Ok().json(updated_task))
}

#[delete("/{task_id_path}")]
pub async fn delete_task_handler(
    pool: web::Data<DbPool>,
    task_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let task_to_delete_id = task_id_path.into_inner();

    let mut conn = pool.get().await?;

    let now = Utc::now();
    let num_deleted = diesel::update(
        tasks
            .filter(id.eq(task_to_delete_id))
            .filter(deleted_at.is_null()),
    )
    .set((deleted_at.eq(Some(now)), updated_at.eq(now)))
    .execute(&mut conn)
    .await
    .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        log::info!("Task {} soft-deleted", task_to_delete_id);
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "Task deleted successfully"
        })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Task with id {} not found",
            task_to_delete_id
        )))
    }
}
