use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    CreateEventPayload, Event, EventDetails, EventRangeQuery, EventRecord, EventSource, Habit,
    NewEventRecord, Task, UpdateEventChangeset, UpdateEventPayload, DEFAULT_PRIORITY,
};
use crate::schema::{
    calendar_events::{self, dsl::*},
    habits, tasks,
};
use crate::store::TimeWindow;
use actix_web::{delete, get, post, put, web, HttpResponse, Result as ActixResult};
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// `[start 00:00, end + 1 day 00:00]`, both bounds inclusive.
fn range_window(query: &EventRangeQuery) -> Result<TimeWindow, ServiceError> {
    let (Some(start), Some(end)) = (query.start.as_deref(), query.end.as_deref()) else {
        return Err(ServiceError::BadRequest(
            "start and end dates are required".to_string(),
        ));
    };

    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|_| ServiceError::BadRequest("Invalid start date format".to_string()))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .map_err(|_| ServiceError::BadRequest("Invalid end date format".to_string()))?;

    if start > end {
        return Err(ServiceError::BadRequest(
            "start cannot be after end".to_string(),
        ));
    }

    Ok(TimeWindow {
        start: TimeWindow::day(start).start,
        end: TimeWindow::day(end).start + Duration::days(1),
    })
}

fn validate_duration(value: Option<i32>) -> Result<(), ServiceError> {
    match value {
        Some(minutes) if minutes < 0 => Err(ServiceError::BadRequest(
            "duration cannot be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_title(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Builds the insert row, rejecting sources that do not name exactly one origin.
fn new_event_record(payload: CreateEventPayload) -> Result<NewEventRecord, ServiceError> {
    validate_duration(payload.duration)?;

    let event_moment = payload.event_date.or(payload.date).ok_or_else(|| {
        ServiceError::BadRequest("event_date (or date) is required".to_string())
    })?;

    let source = EventSource::from_parts(
        payload.event_type.as_deref().unwrap_or("custom"),
        payload.task_id,
        payload.habit_id,
    )
    .map_err(ServiceError::BadRequest)?;

    Ok(NewEventRecord {
        title: validate_title(&payload.title)?,
        description: payload.description,
        event_date: event_moment,
        priority: payload
            .priority
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
        all_day: payload.all_day.unwrap_or(false),
        duration: payload.duration.unwrap_or(0),
        event_type: source.event_type().to_string(),
        task_id: source.task_id(),
        habit_id: source.habit_id(),
    })
}

/// Pairs each event with its task or habit. Sources missing from the lookups
/// (soft-deleted since) are left out.
fn attach_sources(
    events: Vec<Event>,
    linked_tasks: Vec<Task>,
    linked_habits: Vec<Habit>,
) -> Vec<EventDetails> {
    let tasks_by_id: HashMap<Uuid, Task> = linked_tasks.into_iter().map(|t| (t.id, t)).collect();
    let habits_by_id: HashMap<Uuid, Habit> =
        linked_habits.into_iter().map(|h| (h.id, h)).collect();

    events
        .into_iter()
        .map(|event| {
            let task = event
                .source
                .task_id()
                .and_then(|key| tasks_by_id.get(&key).cloned());
            let habit = event
                .source
                .habit_id()
                .and_then(|key| habits_by_id.get(&key).cloned());
            EventDetails { event, task, habit }
        })
        .collect()
}

// One IN lookup per source table instead of a query per event.
async fn load_event_details(
    conn: &mut AsyncPgConnection,
    records: Vec<EventRecord>,
) -> Result<Vec<EventDetails>, ServiceError> {
    let events: Vec<Event> = records.into_iter().map(Event::from).collect();
    let task_keys: Vec<Uuid> = events.iter().filter_map(|e| e.source.task_id()).collect();
    let habit_keys: Vec<Uuid> = events.iter().filter_map(|e| e.source.habit_id()).collect();

    let linked_tasks = if task_keys.is_empty() {
        Vec::new()
    } else {
        tasks::table
            .filter(tasks::id.eq_any(task_keys))
            .filter(tasks::deleted_at.is_null())
            .select(Task::as_select())
            .load::<Task>(conn)
            .await?
    };

    let linked_habits = if habit_keys.is_empty() {
        Vec::new()
    } else {
        habits::table
            .filter(habits::id.eq_any(habit_keys))
            .filter(habits::deleted_at.is_null())
            .select(Habit::as_select())
            .load::<Habit>(conn)
            .await?
    };

    Ok(attach_sources(events, linked_tasks, linked_habits))
}

async fn load_single_event_details(
    conn: &mut AsyncPgConnection,
    record: EventRecord,
) -> Result<EventDetails, ServiceError> {
    load_event_details(conn, vec![record])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::InternalServerError("Event details missing".to_string()))
}

// === GET /calendar/events ===
#[get("/events")]
pub async fn list_events_handler(
    pool: web::Data<DbPool>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let records = calendar_events
        .filter(deleted_at.is_null())
        .order(event_date.asc())
        .select(EventRecord::as_select())
        .load::<EventRecord>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let events = load_event_details(&mut conn, records).await?;
    Ok(HttpResponse::Ok().json(events))
}

// === GET /calendar/events/range?start=YYYY-MM-DD&end=YYYY-MM-DD ===
#[get("/events/range")]
pub async fn list_events_in_range_handler(
    pool: web::Data<DbPool>,
    query_params: web::Query<EventRangeQuery>,
) -> ActixResult<HttpResponse, ServiceError> {
    let window = range_window(&query_params)?;
    log::debug!(
        "Fetching events between {} and {}",
        window.start,
        window.end
    );

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let records = calendar_events
        .filter(deleted_at.is_null())
        .filter(event_date.between(window.start, window.end))
        .order(event_date.asc())
        .select(EventRecord::as_select())
        .load::<EventRecord>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let events = load_event_details(&mut conn, records).await?;
    Ok(HttpResponse::Ok().json(events))
}

// === POST /calendar/events ===
#[post("/events")]
pub async fn create_event_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<CreateEventPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Creating calendar event with payload: {:?}", payload.0);
    let new_record = new_event_record(payload.into_inner())?;

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    // Verify the back-reference resolves to a live row
    if let Some(linked_task) = new_record.task_id {
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
    if let Some(linked_habit) = new_record.habit_id {
        habits::table
            .filter(habits::id.eq(linked_habit))
            .filter(habits::deleted_at.is_null())
            .select(habits::id)
            .first::<Uuid>(&mut conn)
            .await
            .map_err(|db_err| match db_err {
                diesel::result::Error::NotFound => {
                    ServiceError::NotFound(format!("Habit with id {} not found", linked_habit))
                }
                _ => ServiceError::from(db_err),
            })?;
    }

    let created = diesel::insert_into(calendar_events::table)
        .values(&new_record)
        .returning(EventRecord::as_returning())
        .get_result::<EventRecord>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    log::info!("Calendar event created: {}", created.id);
    let created = load_single_event_details(&mut conn, created).await?;
    Ok(HttpResponse::Ok().json(created))
}

// === GET /calendar/events/{event_id_path} ===
#[get("/events/{event_id_path}")]
pub async fn get_event_handler(
    pool: web::Data<DbPool>,
    event_id_path: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let event_to_find_id = event_id_path.into_inner();

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let record = calendar_events
        .filter(id.eq(event_to_find_id))
        .filter(deleted_at.is_null())
        .select(EventRecord::as_select())
        .first::<EventRecord>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match record {
        Some(record) => {
            let details = load_single_event_details(&mut conn, record).await?;
            Ok(HttpResponse::Ok().json(details))
        }
        None => Err(ServiceError::NotFound("Event not found".to_string())),
    }
}

// === PUT /calendar/events/{event_id_path} ===
#[put("/events/{event_id_path}")]
pub async fn update_event_handler(
    pool: web::Data<DbPool>,
    event_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateEventPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let event_to_update_id = event_id_path.into_inner();
    let payload = payload.into_inner();
    log::info!(
        "Updating calendar event {} with payload: {:?}",
        event_to_update_id,
        payload
    );

    validate_duration(payload.duration)?;

    let event_changes = UpdateEventChangeset {
        title: payload.title.as_deref().map(validate_title).transpose()?,
        description: payload.description,
        event_date: payload.event_date,
        priority: payload.priority,
        all_day: payload.all_day,
        duration: payload.duration,
        updated_at: Some(Utc::now()),
    };

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let updated = diesel::update(
        calendar_events
            .filter(id.eq(event_to_update_id))
            .filter(deleted_at.is_null()),
    )
    .set(&event_changes)
    .returning(EventRecord::as_returning())
    .get_result::<EventRecord>(&mut conn)
    .await
    .map_err(|db_err| match db_err {
        diesel::result::Error::NotFound => ServiceError::NotFound("Event not found".to_string()),
        _ => ServiceError::from(db_err),
    })?;

    let updated = load_single_event_details(&mut conn, updated).await?;
    Ok(HttpResponse::Ok().json(updated))
}

// === DELETE /calendar/events/{event_id_path} ===
#[delete("/events/{event_id_path}")]
pub async fn delete_event_handler(
    pool: web::Data<DbPool>,
    event_id_path: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let event_to_delete_id = event_id_path.into_inner();

    let mut conn = pool.get().await.map_err(ServiceError::from)?;

    let now = Utc::now();
    let num_deleted = diesel::update(
        calendar_events
            .filter(id.eq(event_to_delete_id))
            .filter(deleted_at.is_null()),
    )
    .set((deleted_at.eq(Some(now)), updated_at.eq(now)))
    .execute(&mut conn)
    .await
    .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        log::info!("Calendar event {} soft-deleted", event_to_delete_id);
        Ok(HttpResponse::Ok().json(json!({ "message": "Event deleted successfully" })))
    } else {
        Err(ServiceError::NotFound("Event not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn range(start: Option<&str>, end: Option<&str>) -> EventRangeQuery {
        EventRangeQuery {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    fn payload(json: serde_json::Value) -> CreateEventPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn range_includes_the_whole_end_day() {
        let window = range_window(&range(Some("2025-03-01"), Some("2025-03-07"))).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 3, 7, 23, 59, 59).unwrap()));
    }

    #[test]
    fn single_day_range_spans_to_next_midnight() {
        let window = range_window(&range(Some("2025-03-01"), Some("2025-03-01"))).unwrap();
        assert_eq!(window.end - window.start, Duration::days(1));
    }

    fn stored_event(title_text: &str, source: EventSource) -> Event {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
        Event {
            id: Uuid::new_v4(),
            title: title_text.to_string(),
            description: None,
            event_date: now,
            priority: DEFAULT_PRIORITY.to_string(),
            all_day: false,
            duration: 30,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    fn stored_task(task_key: Uuid) -> Task {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        Task {
            id: task_key,
            title: "Write report".to_string(),
            completed: false,
            due_date: None,
            priority: DEFAULT_PRIORITY.to_string(),
            description: None,
            calendar_event_id: None,
            estimated_pomodoros: 2,
            completed_pomodoros: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn stored_habit(habit_key: Uuid) -> Habit {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        Habit {
            id: habit_key,
            name: "Meditate".to_string(),
            frequency: Default::default(),
            completed_today: false,
            streak: 3,
            color: None,
            last_completed: None,
            target_time: Some("07:00".to_string()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn events_carry_their_task_or_habit() {
        let task_key = Uuid::new_v4();
        let habit_key = Uuid::new_v4();
        let gone_key = Uuid::new_v4();

        let details = attach_sources(
            vec![
                stored_event("Work", EventSource::Task { task_id: task_key }),
                stored_event("Meditate", EventSource::Habit { habit_id: habit_key }),
                stored_event("Dentist", EventSource::Custom),
                stored_event("Old", EventSource::Task { task_id: gone_key }),
            ],
            vec![stored_task(task_key)],
            vec![stored_habit(habit_key)],
        );

        assert_eq!(details.len(), 4);
        assert_eq!(details[0].task.as_ref().map(|t| t.id), Some(task_key));
        assert!(details[0].habit.is_none());
        assert_eq!(details[1].habit.as_ref().map(|h| h.id), Some(habit_key));
        assert!(details[1].task.is_none());
        assert!(details[2].task.is_none() && details[2].habit.is_none());
        assert!(details[3].task.is_none());
    }

    #[test]
    fn event_details_serialize_flat_with_embedded_source() {
        let task_key = Uuid::new_v4();
        let details = attach_sources(
            vec![stored_event("Work", EventSource::Task { task_id: task_key })],
            vec![stored_task(task_key)],
            Vec::new(),
        );

        let body = serde_json::to_value(&details[0]).unwrap();
        assert_eq!(body["title"], "Work");
        assert_eq!(body["event_type"], "task");
        assert_eq!(body["task_id"], task_key.to_string());
        assert_eq!(body["task"]["title"], "Write report");
        assert!(body["habit"].is_null());
    }

    #[test]
    fn range_requires_both_bounds_in_order() {
        assert!(range_window(&range(Some("2025-03-01"), None)).is_err());
        assert!(range_window(&range(Some("03/01/2025"), Some("2025-03-02"))).is_err());
        assert!(range_window(&range(Some("2025-03-05"), Some("2025-03-01"))).is_err());
    }

    #[test]
    fn custom_event_defaults() {
        let record = new_event_record(payload(json!({
            "title": "Dentist",
            "date": "2025-03-04"
        })))
        .unwrap();

        assert_eq!(record.event_type, "custom");
        assert_eq!(record.priority, DEFAULT_PRIORITY);
        assert_eq!(record.duration, 0);
        assert_eq!(record.event_date.hour(), 9);
        assert_eq!(record.task_id, None);
        assert_eq!(record.habit_id, None);
    }

    #[test]
    fn task_event_needs_its_task_id() {
        let result = new_event_record(payload(json!({
            "title": "Work",
            "event_date": "2025-03-04T10:00:00Z",
            "event_type": "task"
        })));
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));

        let task = Uuid::new_v4();
        let record = new_event_record(payload(json!({
            "title": "Work",
            "event_date": "2025-03-04T10:00:00Z",
            "event_type": "task",
            "task_id": task
        })))
        .unwrap();
        assert_eq!(record.task_id, Some(task));
    }

    #[test]
    fn event_without_a_date_is_rejected() {
        let result = new_event_record(payload(json!({ "title": "Someday" })));
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }
}
