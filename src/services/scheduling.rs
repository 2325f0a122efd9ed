//! Projects tasks and habits onto calendar events.

use crate::error_handler::ServiceError;
use crate::models::{
    default_time_of_day, parse_target_time, Event, EventSource, Habit, HabitFrequency, NewEvent,
    Task,
};
use crate::store::ProductivityStore;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const HABIT_EVENT_DURATION: i32 = 30;
pub const HABIT_EVENT_PRIORITY: &str = "medium";
pub const HABIT_EVENT_DESCRIPTION: &str = "Habit reminder";
/// Upper bound on `days`, keeps a single batched insert under Postgres'
/// bind-parameter limit.
pub const MAX_SCHEDULE_DAYS: i32 = 730;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScheduledHabitEvents {
    pub scheduled_events: usize,
    pub events: Vec<Event>,
}

/// Whether a habit recurring from `anchor` lands on `day`. Monthly habits
/// anchored on the 29th-31st simply skip months without that day.
pub fn occurs_on(frequency: HabitFrequency, anchor: NaiveDate, day: NaiveDate) -> bool {
    match frequency {
        HabitFrequency::Daily => true,
        HabitFrequency::Weekly => day.weekday() == anchor.weekday(),
        HabitFrequency::Monthly => day.day() == anchor.day(),
    }
}

pub fn habit_time_of_day(habit: &Habit) -> NaiveTime {
    match habit.target_time.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_target_time(raw).unwrap_or_else(|reason| {
            log::warn!(
                "Habit {} has an unusable target time ({}), defaulting to 09:00",
                habit.id,
                reason
            );
            default_time_of_day()
        }),
        _ => default_time_of_day(),
    }
}

/// Events for every day in `[start_date, start_date + days)` on which the
/// habit occurs.
pub fn plan_habit_events(habit: &Habit, start_date: NaiveDate, days: u32) -> Vec<NewEvent> {
    let time_of_day = habit_time_of_day(habit);

    start_date
        .iter_days()
        .take(days as usize)
        .filter(|day| occurs_on(habit.frequency, start_date, *day))
        .map(|day| NewEvent {
            title: format!("🎯 {}", habit.name),
            description: Some(HABIT_EVENT_DESCRIPTION.to_string()),
            event_date: Utc.from_utc_datetime(&day.and_time(time_of_day)),
            priority: HABIT_EVENT_PRIORITY.to_string(),
            all_day: false,
            duration: HABIT_EVENT_DURATION,
            source: EventSource::Habit { habit_id: habit.id },
        })
        .collect()
}

pub fn plan_task_event(task: &Task, event_date: DateTime<Utc>, duration: i32) -> NewEvent {
    NewEvent {
        title: format!("Work on: {}", task.title),
        description: task.description.clone(),
        event_date,
        priority: task.priority.clone(),
        all_day: false,
        duration,
        source: EventSource::Task { task_id: task.id },
    }
}

pub async fn schedule_task_event<S: ProductivityStore>(
    store: &S,
    task_id: Uuid,
    event_date: DateTime<Utc>,
    duration: i32,
) -> Result<Event, ServiceError> {
    if duration < 0 {
        return Err(ServiceError::BadRequest(
            "duration cannot be negative".to_string(),
        ));
    }

    let task = store
        .find_task(task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Task with id {} not found", task_id)))?;

    let event = store
        .insert_task_event(task.id, plan_task_event(&task, event_date, duration))
        .await?;

    log::info!(
        "Scheduled task {} as calendar event {} at {}",
        task.id,
        event.id,
        event.event_date
    );
    Ok(event)
}

pub async fn schedule_habit_events<S: ProductivityStore>(
    store: &S,
    habit_id: Uuid,
    start_date: NaiveDate,
    days: i32,
) -> Result<ScheduledHabitEvents, ServiceError> {
    let days = u32::try_from(days)
        .ok()
        .filter(|days| *days <= MAX_SCHEDULE_DAYS as u32)
        .ok_or_else(|| {
            ServiceError::BadRequest(format!(
                "days must be between 0 and {}, got {}",
                MAX_SCHEDULE_DAYS, days
            ))
        })?;

    let habit = store
        .find_habit(habit_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Habit with id {} not found", habit_id)))?;

    let planned = plan_habit_events(&habit, start_date, days);
    log::debug!(
        "Habit {} ({}) occurs {} times in {} days from {}",
        habit.id,
        habit.frequency,
        planned.len(),
        days,
        start_date
    );

    let events = store.insert_events(planned).await?;

    log::info!("Scheduled {} events for habit {}", events.len(), habit.id);
    Ok(ScheduledHabitEvents {
        scheduled_events: events.len(),
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{Timelike, Weekday};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(frequency: HabitFrequency, target_time: Option<&str>) -> Habit {
        let now = Utc::now();
        Habit {
            id: Uuid::new_v4(),
            name: "Stretch".to_string(),
            frequency,
            completed_today: false,
            streak: 0,
            color: None,
            last_completed: None,
            target_time: target_time.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn daily_habit_gets_one_event_per_day() {
        let planned = plan_habit_events(&habit(HabitFrequency::Daily, None), date(2025, 3, 1), 5);

        assert_eq!(planned.len(), 5);
        for (offset, event) in planned.iter().enumerate() {
            assert_eq!(
                event.event_date.date_naive(),
                date(2025, 3, 1 + offset as u32)
            );
            assert_eq!(event.event_date.hour(), 9);
            assert_eq!(event.duration, HABIT_EVENT_DURATION);
            assert_eq!(event.priority, "medium");
        }
    }

    #[test]
    fn weekly_habit_keeps_the_start_weekday() {
        // 2025-01-15 is a Wednesday.
        let planned =
            plan_habit_events(&habit(HabitFrequency::Weekly, None), date(2025, 1, 15), 15);

        let dates: Vec<NaiveDate> = planned.iter().map(|e| e.event_date.date_naive()).collect();
        assert_eq!(
            dates,
            vec![date(2025, 1, 15), date(2025, 1, 22), date(2025, 1, 29)]
        );
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Wed));
    }

    #[test]
    fn monthly_habit_from_mid_january_over_forty_days() {
        let planned = plan_habit_events(
            &habit(HabitFrequency::Monthly, Some("09:00")),
            date(2025, 1, 15),
            40,
        );

        let dates: Vec<DateTime<Utc>> = planned.iter().map(|e| e.event_date).collect();
        assert_eq!(
            dates,
            vec![
                Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 2, 15, 9, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn monthly_habit_on_the_31st_skips_short_months() {
        let planned =
            plan_habit_events(&habit(HabitFrequency::Monthly, None), date(2025, 1, 31), 90);

        let dates: Vec<NaiveDate> = planned.iter().map(|e| e.event_date.date_naive()).collect();
        assert_eq!(dates, vec![date(2025, 1, 31), date(2025, 3, 31)]);
    }

    #[test]
    fn target_time_sets_the_time_of_day() {
        let planned = plan_habit_events(
            &habit(HabitFrequency::Daily, Some("18:30")),
            date(2025, 3, 1),
            1,
        );
        assert_eq!(
            planned[0].event_date,
            Utc.with_ymd_and_hms(2025, 3, 1, 18, 30, 0).unwrap()
        );
    }

    #[test]
    fn unusable_target_time_falls_back_to_nine() {
        let time = habit_time_of_day(&habit(HabitFrequency::Daily, Some("after lunch")));
        assert_eq!(time, default_time_of_day());
    }

    #[test]
    fn habit_events_link_back_to_the_habit() {
        let stretch = habit(HabitFrequency::Daily, None);
        let planned = plan_habit_events(&stretch, date(2025, 3, 1), 1);

        assert_eq!(planned[0].title, "🎯 Stretch");
        assert_eq!(planned[0].description.as_deref(), Some("Habit reminder"));
        assert_eq!(
            planned[0].source,
            EventSource::Habit {
                habit_id: stretch.id
            }
        );
    }

    #[tokio::test]
    async fn scheduling_a_task_links_it_to_the_new_event() {
        let store = MemoryStore::new();
        let mut task = store.add_task("Write report");
        task.description = Some("Q3 numbers".to_string());
        task.priority = "high".to_string();
        store.put_task(task.clone());

        let at = Utc.with_ymd_and_hms(2025, 4, 2, 14, 0, 0).unwrap();
        let event = schedule_task_event(&store, task.id, at, 50).await.unwrap();

        assert_eq!(event.title, "Work on: Write report");
        assert_eq!(event.description.as_deref(), Some("Q3 numbers"));
        assert_eq!(event.priority, "high");
        assert_eq!(event.duration, 50);
        assert_eq!(event.event_date, at);
        assert_eq!(event.source, EventSource::Task { task_id: task.id });

        let reloaded = store.task(task.id).unwrap();
        assert_eq!(reloaded.calendar_event_id, Some(event.id));
    }

    #[tokio::test]
    async fn scheduling_a_missing_task_is_not_found() {
        let store = MemoryStore::new();
        let result = schedule_task_event(&store, Uuid::new_v4(), Utc::now(), 25).await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn failed_task_event_write_is_a_store_failure() {
        let store = MemoryStore::new();
        let task = store.add_task("Write report");
        store.fail_writes(true);

        let result = schedule_task_event(&store, task.id, Utc::now(), 25).await;

        assert!(matches!(result, Err(ServiceError::DatabaseError(_))));
        assert_eq!(store.task(task.id).unwrap().calendar_event_id, None);
    }

    #[tokio::test]
    async fn scheduling_habit_events_persists_the_batch() {
        let store = MemoryStore::new();
        let read = store.add_habit("Read", HabitFrequency::Daily);

        let scheduled = schedule_habit_events(&store, read.id, date(2025, 5, 1), 7)
            .await
            .unwrap();

        assert_eq!(scheduled.scheduled_events, 7);
        assert_eq!(store.events().len(), 7);
        assert!(store
            .events()
            .iter()
            .all(|e| e.source == EventSource::Habit { habit_id: read.id }));
    }

    #[tokio::test]
    async fn zero_days_schedules_nothing() {
        let store = MemoryStore::new();
        let read = store.add_habit("Read", HabitFrequency::Daily);

        let scheduled = schedule_habit_events(&store, read.id, date(2025, 5, 1), 0)
            .await
            .unwrap();

        assert_eq!(scheduled.scheduled_events, 0);
        assert!(scheduled.events.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_events_behind() {
        let store = MemoryStore::new();
        let read = store.add_habit("Read", HabitFrequency::Daily);
        store.fail_writes(true);

        let result = schedule_habit_events(&store, read.id, date(2025, 5, 1), 10).await;

        assert!(matches!(result, Err(ServiceError::DatabaseError(_))));
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_days_are_rejected() {
        let store = MemoryStore::new();
        let read = store.add_habit("Read", HabitFrequency::Daily);

        for days in [-1, MAX_SCHEDULE_DAYS + 1] {
            let result = schedule_habit_events(&store, read.id, date(2025, 5, 1), days).await;
            assert!(matches!(result, Err(ServiceError::BadRequest(_))), "{}", days);
        }
    }

    #[tokio::test]
    async fn missing_habit_is_not_found() {
        let store = MemoryStore::new();
        let result = schedule_habit_events(&store, Uuid::new_v4(), date(2025, 5, 1), 3).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    proptest! {
        #[test]
        fn daily_events_match_the_day_count(offset in 0i64..20_000, days in 0u32..400) {
            let start = date(2000, 1, 1) + chrono::Duration::days(offset);
            let planned = plan_habit_events(&habit(HabitFrequency::Daily, None), start, days);
            prop_assert_eq!(planned.len(), days as usize);
        }

        #[test]
        fn weekly_events_fall_on_the_start_weekday(offset in 0i64..20_000, days in 0u32..400) {
            let start = date(2000, 1, 1) + chrono::Duration::days(offset);
            let planned = plan_habit_events(&habit(HabitFrequency::Weekly, None), start, days);

            let expected = (days as usize).div_ceil(7);
            prop_assert_eq!(planned.len(), expected);
            for event in &planned {
                prop_assert_eq!(event.event_date.date_naive().weekday(), start.weekday());
                prop_assert!(event.event_date.date_naive() >= start);
            }
        }
    }
}
