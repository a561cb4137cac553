//! Cancelling, moving and restoring single occurrences of a recurring
//! template without touching the template itself.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Result, ScheduleError};
use crate::localtime::resolve;
use crate::models::{
    Exception, ExceptionKind, OccurrenceKey, Priority, RecurringTemplate, Task, TaskId,
    TimeOfDay, UserId,
};
use crate::storage::Store;

/// Result of creating an exception. `new_task` is the moved occurrence for a
/// reschedule.
#[derive(Serialize, Debug, Clone)]
pub struct ExceptionOutcome {
    pub exception: Exception,
    pub new_task: Option<Task>,
}

/// Loads the template behind `key` and checks that it actually repeats on
/// that date.
fn occurrence_template(
    store: &dyn Store,
    user: &UserId,
    key: OccurrenceKey,
) -> Result<RecurringTemplate> {
    let template = store
        .template(user, key.template_id)?
        .ok_or_else(|| ScheduleError::not_found("template", key.template_id))?;
    if !template.occurs_on(key.date) {
        return Err(ScheduleError::not_found("occurrence", key));
    }
    Ok(template)
}

fn ensure_no_exception(store: &dyn Store, user: &UserId, key: OccurrenceKey) -> Result<()> {
    match store.exception(user, key)? {
        Some(existing) => Err(ScheduleError::Conflict(format!(
            "occurrence {} is already {}",
            key,
            existing.kind.to_string().to_lowercase()
        ))),
        None => Ok(()),
    }
}

/// Marks one occurrence as cancelled. A second cancel of the same
/// occurrence is rejected with `Conflict`.
pub fn cancel_occurrence(
    store: &dyn Store,
    user: &UserId,
    key: OccurrenceKey,
    now: DateTime<Utc>,
) -> Result<Exception> {
    occurrence_template(store, user, key)?;
    ensure_no_exception(store, user, key)?;
    let exception = Exception {
        user: user.clone(),
        key,
        kind: ExceptionKind::Cancelled,
        linked_task: None,
        created_at: now,
    };
    store.insert_exception(exception.clone())?;
    info!(user = %user, occurrence = %key, "cancelled occurrence");
    Ok(exception)
}

/// Moves one occurrence to `new_date` at `new_time` (local). The moved
/// occurrence becomes a Scheduled, High priority task linked from the
/// exception so that undo can remove it.
pub fn reschedule_occurrence<Tz: TimeZone>(
    store: &dyn Store,
    tz: &Tz,
    user: &UserId,
    key: OccurrenceKey,
    new_date: NaiveDate,
    new_time: TimeOfDay,
    now: DateTime<Utc>,
) -> Result<ExceptionOutcome> {
    let template = occurrence_template(store, user, key)?;
    ensure_no_exception(store, user, key)?;

    let mut task = Task::new(user.clone(), template.title.clone(), template.duration_minutes);
    task.task_type = template.task_type.clone();
    task.priority = Priority::High;
    task.created_at = now;
    task.schedule_at(resolve(tz, new_date, new_time.to_naive()));
    let task = store.insert_task(task)?;

    let exception = Exception {
        user: user.clone(),
        key,
        kind: ExceptionKind::Rescheduled,
        linked_task: Some(task.id),
        created_at: now,
    };
    if let Err(e) = store.insert_exception(exception.clone()) {
        // Do not leave the moved copy behind without its exception.
        if let Err(cleanup) = store.delete_task(user, task.id) {
            error!(task = task.id, error = %cleanup, "failed to remove orphaned rescheduled task");
        }
        return Err(e);
    }

    info!(user = %user, occurrence = %key, task = task.id, "rescheduled occurrence");
    Ok(ExceptionOutcome {
        exception,
        new_task: Some(task),
    })
}

/// Removes the exception for `key`, and for a reschedule also the task it
/// created. Either both are removed or neither is. A given `linked_task`
/// must match the stored link; a cancel has none. If the linked task was
/// already removed, only the exception is.
pub fn undo_exception(
    store: &dyn Store,
    user: &UserId,
    key: OccurrenceKey,
    linked_task: Option<TaskId>,
) -> Result<Exception> {
    let existing = store
        .exception(user, key)?
        .ok_or_else(|| ScheduleError::Conflict(format!("occurrence {} has no exception", key)))?;

    let task_id = match (linked_task, existing.linked_task) {
        (Some(given), Some(stored)) if given != stored => {
            return Err(ScheduleError::InvalidInput(format!(
                "occurrence {} is linked to task {}, not {}",
                key, stored, given
            )))
        }
        (Some(given), None) => {
            return Err(ScheduleError::InvalidInput(format!(
                "occurrence {} is {} and has no linked task, not {}",
                key,
                existing.kind.to_string().to_lowercase(),
                given
            )))
        }
        (_, stored) => stored,
    };
    // A moved task the user already removed leaves only the exception to undo.
    let task_id = match task_id {
        Some(id) if store.task(user, id)?.is_none() => {
            warn!(user = %user, occurrence = %key, task = id, "linked task already removed");
            None
        }
        other => other,
    };

    let removed = store
        .delete_exception(user, key)?
        .ok_or_else(|| ScheduleError::Conflict(format!("occurrence {} has no exception", key)))?;

    if let Some(id) = task_id {
        let outcome = match store.delete_task(user, id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScheduleError::not_found("task", id)),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            if let Err(restore) = store.insert_exception(removed.clone()) {
                error!(occurrence = %key, error = %restore, "failed to restore exception after undo failure");
            }
            return Err(e);
        }
    }

    info!(user = %user, occurrence = %key, kind = %removed.kind, "undid exception");
    Ok(removed)
}
