//! The user-facing service: every operation a client can perform, scoped to
//! one user and serialized per user where it writes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::autoschedule::{self, ScheduleReport};
use crate::clock::Clock;
use crate::config::SchedulerSettings;
use crate::error::{Result, ScheduleError};
use crate::exceptions::{self, ExceptionOutcome};
use crate::models::{
    ColumnDef, ColumnSchema, Exception, ExceptionKind, FieldKind, Occurrence, OccurrenceKey,
    Priority, RecurringTemplate, Status, SuitableTime, Task, TaskId, TemplateDraft, TemplateId,
    TemplateSource, TimeOfDay, UserId,
};
use crate::occurrence;
use crate::storage::Store;

/// Input for a new one-off task. Extra fields are `key=value` pairs checked
/// against the user's column schema.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub duration_minutes: u32,
    pub priority: Option<Priority>,
    pub deadline: Option<DateTime<Utc>>,
    pub task_type: Option<String>,
    pub suitable_time: Option<SuitableTime>,
    pub interest: Option<u8>,
    pub fields: Vec<String>,
}

/// Partial update of a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub duration_minutes: Option<u32>,
    pub priority: Option<Priority>,
    pub deadline: Option<DateTime<Utc>>,
    pub task_type: Option<String>,
    pub suitable_time: Option<SuitableTime>,
    pub interest: Option<u8>,
    pub fields: Vec<String>,
}

#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn for_user(&self, user: &UserId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(user.clone())
            .or_default()
            .clone()
    }
}

pub struct Planner<Tz: TimeZone> {
    store: Box<dyn Store>,
    clock: Box<dyn Clock>,
    tz: Tz,
    settings: SchedulerSettings,
    locks: UserLocks,
}

impl<Tz: TimeZone> Planner<Tz> {
    pub fn new(
        store: Box<dyn Store>,
        clock: Box<dyn Clock>,
        tz: Tz,
        settings: SchedulerSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Planner {
            store,
            clock,
            tz,
            settings,
            locks: UserLocks::default(),
        })
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn tz(&self) -> &Tz {
        &self.tz
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // Tasks

    pub fn tasks(&self, user: &UserId) -> Result<Vec<Task>> {
        self.store.tasks(user)
    }

    pub fn task(&self, user: &UserId, id: TaskId) -> Result<Task> {
        self.store
            .task(user, id)?
            .ok_or_else(|| ScheduleError::not_found("task", id))
    }

    pub fn add_task(&self, user: &UserId, new: NewTask) -> Result<Task> {
        let schema = self.store.columns(user)?;
        let mut task = Task::new(user.clone(), new.title.trim(), new.duration_minutes);
        task.priority = new.priority.unwrap_or_default();
        task.deadline = new.deadline;
        if let Some(kind) = new.task_type {
            task.task_type = kind;
        }
        task.suitable_time = new.suitable_time.unwrap_or_default();
        if let Some(interest) = new.interest {
            task.interest = interest;
        }
        task.extra = new
            .fields
            .iter()
            .map(|pair| schema.parse_field(pair))
            .collect::<Result<Vec<_>>>()?;
        schema.validate(&task.extra)?;
        task.created_at = self.now();
        task.validate()?;

        let task = self.store.insert_task(task)?;
        info!(user = %user, task = task.id, "added task");
        Ok(task)
    }

    pub fn edit_task(&self, user: &UserId, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let mut task = self.task(user, id)?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = Some(deadline);
            if task.status == Status::Delay && deadline > self.now() {
                task.status = Status::Pending;
            }
        }
        if let Some(kind) = patch.task_type {
            task.task_type = kind;
        }
        if let Some(suitable) = patch.suitable_time {
            task.suitable_time = suitable;
        }
        if let Some(interest) = patch.interest {
            task.interest = interest;
        }
        if let Some(minutes) = patch.duration_minutes {
            task.duration_minutes = minutes;
            if let Some(start) = task.start_time {
                task.end_time = Some(start + task.duration());
            }
        }
        if !patch.fields.is_empty() {
            let schema = self.store.columns(user)?;
            for pair in &patch.fields {
                let field = schema.parse_field(pair)?;
                match task.extra.iter_mut().find(|f| f.key == field.key) {
                    Some(existing) => *existing = field,
                    None => task.extra.push(field),
                }
            }
            schema.validate(&task.extra)?;
        }
        task.validate()?;
        self.store.update_task(&task)
    }

    pub fn set_status(&self, user: &UserId, id: TaskId, status: Status) -> Result<Task> {
        let mut task = self.task(user, id)?;
        task.status = status;
        task.validate()?;
        self.store.update_task(&task)
    }

    pub fn remove_task(&self, user: &UserId, id: TaskId) -> Result<()> {
        if self.store.delete_task(user, id)? {
            info!(user = %user, task = id, "removed task");
            Ok(())
        } else {
            Err(ScheduleError::not_found("task", id))
        }
    }

    /// Manually places a task, bypassing the scheduler. No conflict check is
    /// made. The duration follows the new interval; a Pending or Delay task
    /// becomes Scheduled.
    pub fn move_task(
        &self,
        user: &UserId,
        id: TaskId,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Task> {
        if new_end <= new_start {
            return Err(ScheduleError::InvalidInput(
                "the new end must be after the new start".into(),
            ));
        }
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();

        let mut task = self.task(user, id)?;
        let minutes = (new_end - new_start).num_minutes();
        task.duration_minutes = u32::try_from(minutes)
            .map_err(|_| ScheduleError::InvalidInput(format!("{} minutes is out of range", minutes)))?;
        task.start_time = Some(new_start);
        task.end_time = Some(new_end);
        if matches!(task.status, Status::Pending | Status::Delay) {
            task.status = Status::Scheduled;
        }
        task.validate()?;
        let task = self.store.update_task(&task)?;
        info!(user = %user, task = id, start = %new_start, "moved task");
        Ok(task)
    }

    // Recurring templates

    pub fn templates(&self, user: &UserId) -> Result<Vec<RecurringTemplate>> {
        self.store.templates(user)
    }

    pub fn add_template(&self, user: &UserId, draft: TemplateDraft) -> Result<RecurringTemplate> {
        let mut template = draft.into_template(user.clone(), TemplateSource::Manual);
        template.created_at = self.now();
        template.validate()?;
        let template = self.store.insert_template(template)?;
        info!(user = %user, template = template.id, "added recurring template");
        Ok(template)
    }

    /// Deletes a template. Its exceptions are left in place.
    pub fn remove_template(&self, user: &UserId, id: TemplateId) -> Result<()> {
        if self.store.delete_template(user, id)? {
            Ok(())
        } else {
            Err(ScheduleError::not_found("template", id))
        }
    }

    /// Validates drafts from an external extractor and, when `commit` is
    /// set, stores them tagged as AI imports. Nothing is stored if any draft
    /// is invalid.
    pub fn import_templates(
        &self,
        user: &UserId,
        drafts: Vec<TemplateDraft>,
        commit: bool,
    ) -> Result<Vec<RecurringTemplate>> {
        let now = self.now();
        let templates = drafts
            .into_iter()
            .map(|d| {
                let mut t = d.into_template(user.clone(), TemplateSource::AiImport);
                t.created_at = now;
                t.validate().map(|_| t)
            })
            .collect::<Result<Vec<_>>>()?;
        if !commit {
            return Ok(templates);
        }
        let stored = templates
            .into_iter()
            .map(|t| self.store.insert_template(t))
            .collect::<Result<Vec<_>>>()?;
        info!(user = %user, count = stored.len(), "imported recurring templates");
        Ok(stored)
    }

    // Extra columns

    pub fn columns(&self, user: &UserId) -> Result<ColumnSchema> {
        self.store.columns(user)
    }

    pub fn add_column(&self, user: &UserId, key: &str, kind: FieldKind) -> Result<ColumnSchema> {
        let key = key.trim();
        if key.is_empty() || key.contains('=') {
            return Err(ScheduleError::InvalidInput(format!("invalid column name '{}'", key)));
        }
        let mut schema = self.store.columns(user)?;
        if schema.column(key).is_some() {
            return Err(ScheduleError::Conflict(format!("column '{}' already exists", key)));
        }
        schema.columns.push(ColumnDef {
            key: key.to_string(),
            kind,
        });
        self.store.save_columns(&schema)?;
        Ok(schema)
    }

    // Schedule and exceptions

    /// Occurrences between two local dates, inclusive.
    pub fn schedule(&self, user: &UserId, start: NaiveDate, end: NaiveDate) -> Result<Vec<Occurrence>> {
        occurrence::materialize(self.store.as_ref(), &self.tz, user, start, end)
    }

    pub fn cancel_occurrence(
        &self,
        user: &UserId,
        template_id: TemplateId,
        date: NaiveDate,
    ) -> Result<ExceptionOutcome> {
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();
        let exception = exceptions::cancel_occurrence(
            self.store.as_ref(),
            user,
            OccurrenceKey::new(template_id, date),
            self.now(),
        )?;
        Ok(ExceptionOutcome {
            exception,
            new_task: None,
        })
    }

    pub fn reschedule_occurrence(
        &self,
        user: &UserId,
        template_id: TemplateId,
        date: NaiveDate,
        new_date: NaiveDate,
        new_time: TimeOfDay,
    ) -> Result<ExceptionOutcome> {
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();
        exceptions::reschedule_occurrence(
            self.store.as_ref(),
            &self.tz,
            user,
            OccurrenceKey::new(template_id, date),
            new_date,
            new_time,
            self.now(),
        )
    }

    /// Creates an exception of either kind. A reschedule needs both the new
    /// date and the new time.
    pub fn create_exception(
        &self,
        user: &UserId,
        template_id: TemplateId,
        date: NaiveDate,
        kind: ExceptionKind,
        new_date: Option<NaiveDate>,
        new_time: Option<TimeOfDay>,
    ) -> Result<ExceptionOutcome> {
        match (kind, new_date, new_time) {
            (ExceptionKind::Cancelled, _, _) => self.cancel_occurrence(user, template_id, date),
            (ExceptionKind::Rescheduled, Some(new_date), Some(new_time)) => {
                self.reschedule_occurrence(user, template_id, date, new_date, new_time)
            }
            (ExceptionKind::Rescheduled, _, _) => Err(ScheduleError::InvalidInput(
                "a reschedule needs a new date and a new time".into(),
            )),
        }
    }

    pub fn undo_exception(
        &self,
        user: &UserId,
        template_id: TemplateId,
        date: NaiveDate,
        linked_task: Option<TaskId>,
    ) -> Result<Exception> {
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();
        exceptions::undo_exception(
            self.store.as_ref(),
            user,
            OccurrenceKey::new(template_id, date),
            linked_task,
        )
    }

    // Scheduling

    pub fn reconcile_delays(&self, user: &UserId) -> Result<Vec<TaskId>> {
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();
        autoschedule::reconcile_delays(self.store.as_ref(), user, self.now())
    }

    pub fn auto_schedule(&self, user: &UserId) -> Result<ScheduleReport> {
        let lock = self.locks.for_user(user);
        let _guard = lock.lock();
        autoschedule::auto_schedule(self.store.as_ref(), &self.tz, &self.settings, user, self.now())
    }
}

/// Reads a JSON array of template drafts, as written by an external
/// schedule extractor.
pub fn read_template_drafts(path: &Path) -> Result<Vec<TemplateDraft>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
