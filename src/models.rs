use crate::schema::{calendar_events, focus_sessions, habits, pomodoro_sessions, tasks};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PRIORITY: &str = "medium";

/// Time of day used when a request only carries a calendar date.
pub fn default_time_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

// --- Date parsing ---

/// Accepts RFC3339, `YYYY-MM-DDTHH:MM:SS` (read as UTC) or `YYYY-MM-DD`
/// (pinned to 09:00 UTC).
pub fn parse_flexible_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(default_time_of_day())));
    }
    Err(format!(
        "invalid date '{}': expected RFC3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD",
        raw
    ))
}

/// Calendar date of a flexible timestamp, read in the offset it was written
/// in rather than after conversion to UTC.
pub fn parse_flexible_date(raw: &str) -> Result<NaiveDate, String> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(parsed) => Ok(parsed.date_naive()),
        Err(_) => parse_flexible_datetime(raw).map(|parsed| parsed.date_naive()),
    }
}

/// Parses a `HH:MM` target time.
pub fn parse_target_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| format!("invalid target_time '{}': expected HH:MM", raw))
}

fn deserialize_flexible_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flexible_datetime(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_flexible_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flexible_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_opt_flexible_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_flexible_datetime(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

// Absent -> None (untouched), null -> Some(None) (cleared).
fn deserialize_opt_opt_flexible_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_opt_flexible_datetime(deserializer).map(Some)
}

fn deserialize_opt_opt_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn deserialize_opt_opt_uuid<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

// --- Text-backed enums ---

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl HabitFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitFrequency::Daily => "daily",
            HabitFrequency::Weekly => "weekly",
            HabitFrequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for HabitFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HabitFrequency {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "daily" => Ok(HabitFrequency::Daily),
            "weekly" => Ok(HabitFrequency::Weekly),
            "monthly" => Ok(HabitFrequency::Monthly),
            other => Err(format!("unknown habit frequency '{}'", other)),
        }
    }
}

impl ToSql<Text, Pg> for HabitFrequency {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for HabitFrequency {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    Work,
    #[serde(alias = "short", alias = "short-break")]
    ShortBreak,
    #[serde(alias = "long", alias = "long-break")]
    LongBreak,
}

impl PomodoroPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroPhase::Work => "work",
            PomodoroPhase::ShortBreak => "short_break",
            PomodoroPhase::LongBreak => "long_break",
        }
    }
}

impl fmt::Display for PomodoroPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PomodoroPhase {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "work" => Ok(PomodoroPhase::Work),
            "short_break" | "short-break" | "short" => Ok(PomodoroPhase::ShortBreak),
            "long_break" | "long-break" | "long" => Ok(PomodoroPhase::LongBreak),
            other => Err(format!("unknown pomodoro phase '{}'", other)),
        }
    }
}

impl ToSql<Text, Pg> for PomodoroPhase {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for PomodoroPhase {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

// --- Task Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: String,
    pub description: Option<String>,
    pub calendar_event_id: Option<Uuid>,
    pub estimated_pomodoros: i32,
    pub completed_pomodoros: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub title: String,
    pub completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: String,
    pub description: Option<String>,
    pub estimated_pomodoros: i32,
    pub completed_pomodoros: i32,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = tasks)]
pub struct UpdateTaskChangeset {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<String>,
    pub description: Option<Option<String>>,
    pub calendar_event_id: Option<Option<Uuid>>,
    pub estimated_pomodoros: Option<i32>,
    pub completed_pomodoros: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Habit Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = habits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Habit {
    pub id: Uuid,
    pub name: String,
    pub frequency: HabitFrequency,
    pub completed_today: bool,
    pub streak: i32,
    pub color: Option<String>,
    pub last_completed: Option<DateTime<Utc>>,
    pub target_time: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = habits)]
pub struct NewHabit {
    pub name: String,
    pub frequency: HabitFrequency,
    pub completed_today: bool,
    pub streak: i32,
    pub color: Option<String>,
    pub last_completed: Option<DateTime<Utc>>,
    pub target_time: Option<String>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = habits)]
pub struct UpdateHabitChangeset {
    pub name: Option<String>,
    pub frequency: Option<HabitFrequency>,
    pub completed_today: Option<bool>,
    pub streak: Option<i32>,
    pub color: Option<Option<String>>,
    pub last_completed: Option<Option<DateTime<Utc>>>,
    pub target_time: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Calendar Event Model ---

/// Where a calendar event came from. Serialized flat as `event_type`
/// plus the matching back-reference, so a task event can never also
/// point at a habit.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "event_type", rename_all = "lowercase")]
pub enum EventSource {
    Task { task_id: Uuid },
    Habit { habit_id: Uuid },
    Pomodoro,
    Custom,
}

impl EventSource {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventSource::Task { .. } => "task",
            EventSource::Habit { .. } => "habit",
            EventSource::Pomodoro => "pomodoro",
            EventSource::Custom => "custom",
        }
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            EventSource::Task { task_id } => Some(*task_id),
            _ => None,
        }
    }

    pub fn habit_id(&self) -> Option<Uuid> {
        match self {
            EventSource::Habit { habit_id } => Some(*habit_id),
            _ => None,
        }
    }

    /// Builds a source from the loose request/row columns, rejecting
    /// combinations that do not name exactly one origin.
    pub fn from_parts(
        event_type: &str,
        task_id: Option<Uuid>,
        habit_id: Option<Uuid>,
    ) -> Result<Self, String> {
        match (event_type, task_id, habit_id) {
            ("task", Some(task_id), None) => Ok(EventSource::Task { task_id }),
            ("habit", None, Some(habit_id)) => Ok(EventSource::Habit { habit_id }),
            ("pomodoro", None, None) => Ok(EventSource::Pomodoro),
            ("custom", None, None) => Ok(EventSource::Custom),
            ("task", None, _) => Err("event_type 'task' requires task_id".to_string()),
            ("habit", _, None) => Err("event_type 'habit' requires habit_id".to_string()),
            ("task" | "habit" | "pomodoro" | "custom", _, _) => Err(format!(
                "event_type '{}' cannot carry both or foreign back-references",
                event_type
            )),
            (other, _, _) => Err(format!(
                "unknown event_type '{}': expected task, habit, pomodoro or custom",
                other
            )),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = calendar_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub priority: String,
    pub all_day: bool,
    pub duration: i32,
    pub event_type: String,
    pub task_id: Option<Uuid>,
    pub habit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub priority: String,
    pub all_day: bool,
    pub duration: i32,
    #[serde(flatten)]
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EventRecord> for Event {
    fn from(record: EventRecord) -> Self {
        let source = EventSource::from_parts(&record.event_type, record.task_id, record.habit_id)
            .unwrap_or_else(|reason| {
                log::warn!(
                    "Calendar event {} has an inconsistent source ({}), treating as custom",
                    record.id,
                    reason
                );
                EventSource::Custom
            });
        Event {
            id: record.id,
            title: record.title,
            description: record.description,
            event_date: record.event_date,
            priority: record.priority,
            all_day: record.all_day,
            duration: record.duration,
            source,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// An event about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub priority: String,
    pub all_day: bool,
    pub duration: i32,
    pub source: EventSource,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = calendar_events)]
pub struct NewEventRecord {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub priority: String,
    pub all_day: bool,
    pub duration: i32,
    pub event_type: String,
    pub task_id: Option<Uuid>,
    pub habit_id: Option<Uuid>,
}

impl From<NewEvent> for NewEventRecord {
    fn from(event: NewEvent) -> Self {
        NewEventRecord {
            event_type: event.source.event_type().to_string(),
            task_id: event.source.task_id(),
            habit_id: event.source.habit_id(),
            title: event.title,
            description: event.description,
            event_date: event.event_date,
            priority: event.priority,
            all_day: event.all_day,
            duration: event.duration,
        }
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = calendar_events)]
pub struct UpdateEventChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub event_date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub all_day: Option<bool>,
    pub duration: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- PomodoroSession Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = pomodoro_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PomodoroSession {
    pub id: Uuid,
    pub phase: PomodoroPhase,
    pub duration: i32,
    pub completed_at: DateTime<Utc>,
    pub task_id: Option<Uuid>,
    pub notes: Option<String>,
    pub productive: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = pomodoro_sessions)]
pub struct NewPomodoroSession {
    pub phase: PomodoroPhase,
    pub duration: i32,
    pub completed_at: DateTime<Utc>,
    pub task_id: Option<Uuid>,
    pub notes: Option<String>,
    pub productive: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PomodoroStats {
    #[serde(rename = "completedSessions")]
    pub completed_sessions: i64,
    #[serde(rename = "totalMinutes")]
    pub total_minutes: i64,
    #[serde(rename = "todaySessions")]
    pub today_sessions: i64,
}

// --- FocusSession Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = focus_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FocusSession {
    pub id: Uuid,
    pub task_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub planned_duration: i32,
    pub actual_duration: Option<i32>,
    pub notes: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FocusSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = focus_sessions)]
pub struct NewFocusSession {
    pub task_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub planned_duration: i32,
}

/// Fields written when a focus session is closed.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = focus_sessions)]
#[diesel(treat_none_as_null = true)]
pub struct CloseFocusSessionChangeset {
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration: Option<i32>,
    pub notes: Option<String>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// A focus session together with the task it is attached to.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FocusSessionDetails {
    #[serde(flatten)]
    pub session: FocusSession,
    pub task: Option<Task>,
}

/// A calendar event with the task or habit that generated it, when still live.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventDetails {
    #[serde(flatten)]
    pub event: Event,
    pub task: Option<Task>,
    pub habit: Option<Habit>,
}

// --- PAYLOAD DTOs ---

#[derive(Deserialize, Debug)]
pub struct CreateTaskPayload {
    pub title: String,
    pub completed: Option<bool>,
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub description: Option<String>,
    pub estimated_pomodoros: Option<i32>,
    pub completed_pomodoros: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateTaskPayload {
    pub title: Option<String>,
    pub completed: Option<bool>,
    #[serde(deserialize_with = "deserialize_opt_opt_flexible_datetime", default)]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_uuid", default)]
    pub calendar_event_id: Option<Option<Uuid>>,
    pub estimated_pomodoros: Option<i32>,
    pub completed_pomodoros: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct CreateHabitPayload {
    pub name: String,
    pub frequency: Option<HabitFrequency>,
    pub completed_today: Option<bool>,
    pub streak: Option<i32>,
    pub color: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub last_completed: Option<DateTime<Utc>>,
    pub target_time: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateHabitPayload {
    pub name: Option<String>,
    pub frequency: Option<HabitFrequency>,
    pub completed_today: Option<bool>,
    pub streak: Option<i32>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub color: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_flexible_datetime", default)]
    pub last_completed: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub target_time: Option<Option<String>>,
}

#[derive(Deserialize, Debug)]
pub struct CreateEventPayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub event_date: Option<DateTime<Utc>>,
    /// Legacy string form of `event_date`.
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub all_day: Option<bool>,
    pub duration: Option<i32>,
    pub event_type: Option<String>,
    pub task_id: Option<Uuid>,
    pub habit_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateEventPayload {
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub event_date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub all_day: Option<bool>,
    pub duration: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct EventRangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreatePomodoroPayload {
    pub phase: PomodoroPhase,
    pub duration: i32,
    #[serde(deserialize_with = "deserialize_opt_flexible_datetime", default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub task_id: Option<Uuid>,
    pub notes: Option<String>,
    pub productive: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct StartFocusPayload {
    pub task_id: Uuid,
    #[serde(default)]
    pub planned_duration: i32,
}

#[derive(Deserialize, Debug)]
pub struct CompleteFocusPayload {
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub pomodoro_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct ScheduleTaskPayload {
    pub task_id: Uuid,
    #[serde(deserialize_with = "deserialize_flexible_datetime")]
    pub event_date: DateTime<Utc>,
    #[serde(default)]
    pub duration: i32,
}

#[derive(Deserialize, Debug)]
pub struct ScheduleHabitPayload {
    pub habit_id: Uuid,
    #[serde(deserialize_with = "deserialize_flexible_date")]
    pub start_date: NaiveDate,
    #[serde(default)]
    pub days: i32,
}
