use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

pub type TaskId = u64;
pub type TemplateId = u64;

/// Longest duration accepted for a task or template, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Owner of every persisted record. Records never cross users.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(name: impl Into<String>) -> Self {
        UserId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl FromStr for Priority {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(ScheduleError::InvalidInput(format!(
                "unknown priority '{}' (low, medium, high, urgent)",
                s
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Pending,
    Scheduled,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Delay,
    Cancelled,
}

impl FromStr for Status {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "pending" => Ok(Status::Pending),
            "scheduled" => Ok(Status::Scheduled),
            "inprogress" => Ok(Status::InProgress),
            "completed" | "done" => Ok(Status::Completed),
            "delay" | "delayed" => Ok(Status::Delay),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            _ => Err(ScheduleError::InvalidInput(format!("unknown status '{}'", s))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::InProgress => f.write_str("In Progress"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Preferred part of the day for a task. Informational; the auto-scheduler
/// does not restrict placement by it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuitableTime {
    #[default]
    Any,
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl FromStr for SuitableTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "any" => Ok(SuitableTime::Any),
            "morning" => Ok(SuitableTime::Morning),
            "afternoon" => Ok(SuitableTime::Afternoon),
            "evening" => Ok(SuitableTime::Evening),
            "night" => Ok(SuitableTime::Night),
            _ => Err(ScheduleError::InvalidInput(format!(
                "unknown suitable time '{}'",
                s
            ))),
        }
    }
}

/// Declared type of a user-defined task column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Checkbox,
}

impl FromStr for FieldKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(FieldKind::Text),
            "number" => Ok(FieldKind::Number),
            "date" => Ok(FieldKind::Date),
            "checkbox" | "bool" => Ok(FieldKind::Checkbox),
            _ => Err(ScheduleError::InvalidInput(format!(
                "unknown column kind '{}' (text, number, date, checkbox)",
                s
            ))),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One value of a user-defined column attached to a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub key: String,
    pub kind: FieldKind,
    pub value: String,
}

impl ExtraField {
    /// Checks that `value` parses as the declared kind.
    pub fn validate(&self) -> Result<()> {
        let ok = match self.kind {
            FieldKind::Text => true,
            FieldKind::Number => self.value.trim().parse::<f64>().is_ok(),
            FieldKind::Date => NaiveDate::parse_from_str(&self.value, "%Y-%m-%d").is_ok(),
            FieldKind::Checkbox => matches!(self.value.as_str(), "true" | "false"),
        };
        if ok {
            Ok(())
        } else {
            Err(ScheduleError::InvalidInput(format!(
                "value '{}' is not a valid {} for column '{}'",
                self.value, self.kind, self.key
            )))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub key: String,
    pub kind: FieldKind,
}

/// The ordered set of extra columns a user has declared for their tasks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub user: UserId,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl ColumnSchema {
    pub fn empty(user: UserId) -> Self {
        ColumnSchema {
            user,
            columns: Vec::new(),
        }
    }

    pub fn column(&self, key: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Builds a typed field from a `key=value` pair using the declared kind.
    pub fn parse_field(&self, pair: &str) -> Result<ExtraField> {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ScheduleError::InvalidInput(format!("expected key=value, got '{}'", pair))
        })?;
        let def = self
            .column(key.trim())
            .ok_or_else(|| ScheduleError::InvalidInput(format!("unknown column '{}'", key.trim())))?;
        let field = ExtraField {
            key: def.key.clone(),
            kind: def.kind,
            value: value.trim().to_string(),
        };
        field.validate()?;
        Ok(field)
    }

    /// Every field must be declared with the same kind and appear at most once.
    pub fn validate(&self, fields: &[ExtraField]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            match self.column(&field.key) {
                Some(def) if def.kind == field.kind => field.validate()?,
                Some(def) => {
                    return Err(ScheduleError::InvalidInput(format!(
                        "column '{}' is declared as {}, got {}",
                        field.key, def.kind, field.kind
                    )))
                }
                None => {
                    return Err(ScheduleError::InvalidInput(format!(
                        "unknown column '{}'",
                        field.key
                    )))
                }
            }
            if fields[..i].iter().any(|f| f.key == field.key) {
                return Err(ScheduleError::InvalidInput(format!(
                    "column '{}' given twice",
                    field.key
                )));
            }
        }
        Ok(())
    }
}

/// A concrete, dated piece of work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub user: UserId,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    pub duration_minutes: u32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub suitable_time: SuitableTime,
    #[serde(default = "default_interest")]
    pub interest: u8,
    #[serde(default)]
    pub extra: Vec<ExtraField>,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every update; stale writes are rejected.
    #[serde(default)]
    pub revision: u64,
}

fn default_task_type() -> String {
    "General".to_string()
}

fn default_interest() -> u8 {
    3
}

impl Task {
    /// A fresh Pending task. The id is assigned by the store on insert.
    pub fn new(user: UserId, title: impl Into<String>, duration_minutes: u32) -> Task {
        Task {
            id: 0,
            user,
            title: title.into(),
            priority: Priority::default(),
            status: Status::Pending,
            duration_minutes,
            deadline: None,
            start_time: None,
            end_time: None,
            task_type: default_task_type(),
            suitable_time: SuitableTime::default(),
            interest: default_interest(),
            extra: Vec::new(),
            created_at: Utc::now(),
            revision: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Neither Completed nor Cancelled.
    pub fn is_open(&self) -> bool {
        !matches!(self.status, Status::Completed | Status::Cancelled)
    }

    /// Open, not already Delay, and past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open()
            && self.status != Status::Delay
            && self.deadline.is_some_and(|d| d < now)
    }

    /// Assigns a slot and marks the task Scheduled.
    pub fn schedule_at(&mut self, start: DateTime<Utc>) {
        self.start_time = Some(start);
        self.end_time = Some(start + self.duration());
        self.status = Status::Scheduled;
    }

    /// The occupied `[start, end)` interval, if the task has one.
    pub fn interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => Some((s, e)),
            (Some(s), None) => Some((s, s + self.duration())),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ScheduleError::InvalidInput("title must not be empty".into()));
        }
        validate_duration(self.duration_minutes)?;
        if !(1..=5).contains(&self.interest) {
            return Err(ScheduleError::InvalidInput(format!(
                "interest must be between 1 and 5, got {}",
                self.interest
            )));
        }
        if self.status == Status::Scheduled {
            match (self.start_time, self.end_time) {
                (Some(s), Some(e)) if e > s => {}
                _ => {
                    return Err(ScheduleError::InvalidInput(
                        "a scheduled task needs a start and an end after it".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_duration(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(ScheduleError::InvalidInput(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, minutes
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }

    pub fn from_weekday(day: Weekday) -> DayOfWeek {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Weekday>()
            .map(DayOfWeek::from_weekday)
            .map_err(|_| ScheduleError::InvalidInput(format!("unknown day of week '{}'", s)))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Wall-clock time of day, stored as "HH:MM".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<TimeOfDay> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidInput(format!(
                "{}:{:02} is not a valid time of day",
                hour, minute
            )));
        }
        Ok(TimeOfDay { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidInput(format!("invalid time '{}', use HH:MM", s));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateSource {
    #[default]
    Manual,
    #[serde(rename = "AI-Import")]
    AiImport,
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Manual => f.write_str("Manual"),
            TemplateSource::AiImport => f.write_str("AI-Import"),
        }
    }
}

/// A weekly recurring commitment: a day of the week and a time of day,
/// with no concrete date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecurringTemplate {
    pub id: TemplateId,
    pub user: UserId,
    pub title: String,
    pub day: DayOfWeek,
    pub time: TimeOfDay,
    #[serde(default = "default_template_duration")]
    pub duration_minutes: u32,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub source: TemplateSource,
    pub created_at: DateTime<Utc>,
}

fn default_template_duration() -> u32 {
    60
}

impl RecurringTemplate {
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether the template repeats on the given calendar date.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        date.weekday() == self.day.to_weekday()
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ScheduleError::InvalidInput("title must not be empty".into()));
        }
        validate_duration(self.duration_minutes)
    }
}

/// A template as supplied by the user or an external extractor, before it
/// is owned and numbered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemplateDraft {
    pub title: String,
    pub day: DayOfWeek,
    pub time: TimeOfDay,
    #[serde(default = "default_template_duration")]
    pub duration_minutes: u32,
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

impl TemplateDraft {
    pub fn into_template(self, user: UserId, source: TemplateSource) -> RecurringTemplate {
        RecurringTemplate {
            id: 0,
            user,
            title: self.title,
            day: self.day,
            time: self.time,
            duration_minutes: self.duration_minutes,
            task_type: self.task_type,
            source,
            created_at: Utc::now(),
        }
    }
}

/// Identity of one occurrence of a recurring template.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceKey {
    pub template_id: TemplateId,
    /// Local calendar date of the occurrence.
    pub date: NaiveDate,
}

impl OccurrenceKey {
    pub fn new(template_id: TemplateId, date: NaiveDate) -> Self {
        OccurrenceKey { template_id, date }
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.template_id, self.date)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Cancelled,
    Rescheduled,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Override of a single occurrence of a recurring template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exception {
    pub user: UserId,
    pub key: OccurrenceKey,
    pub kind: ExceptionKind,
    /// The one-off task created by a reschedule.
    #[serde(default)]
    pub linked_task: Option<TaskId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OccurrenceKind {
    Weekly { key: OccurrenceKey },
    Normal { task_id: TaskId },
}

/// Read-time projection of a template occurrence or a dated task.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Occurrence {
    #[serde(flatten)]
    pub kind: OccurrenceKind,
    pub title: String,
    pub task_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fixed: bool,
    pub cancelled: bool,
    pub exception: Option<ExceptionKind>,
}

impl Occurrence {
    /// Cancelled and rescheduled occurrences are shown but never block time.
    pub fn is_busy(&self) -> bool {
        !self.cancelled
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self.kind, OccurrenceKind::Weekly { .. })
    }

    pub fn weekly_key(&self) -> Option<OccurrenceKey> {
        match self.kind {
            OccurrenceKind::Weekly { key } => Some(key),
            OccurrenceKind::Normal { .. } => None,
        }
    }
}
