#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use weekwise::clock::FixedClock;
use weekwise::config::SchedulerSettings;
use weekwise::models::{
    ColumnSchema, DayOfWeek, Exception, OccurrenceKey, RecurringTemplate, Task, TaskId,
    TemplateDraft, TemplateId, TimeOfDay, UserId,
};
use weekwise::planner::NewTask;
use weekwise::storage::{JsonStore, Store};
use weekwise::{Planner, Result, ScheduleError};

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(s: &str) -> TimeOfDay {
    s.parse().unwrap()
}

pub fn draft(title: &str, day: DayOfWeek, at: &str, minutes: u32) -> TemplateDraft {
    TemplateDraft {
        title: title.into(),
        day,
        time: time(at),
        duration_minutes: minutes,
        task_type: "Routine".into(),
    }
}

pub fn new_task(title: &str, minutes: u32) -> NewTask {
    NewTask {
        title: title.into(),
        duration_minutes: minutes,
        ..Default::default()
    }
}

/// Switches that make [`FlakyStore`] fail on demand.
#[derive(Default)]
pub struct Faults {
    pub fail_delete_task: AtomicBool,
    pub fail_insert_exception: AtomicBool,
    /// Number of `update_task` calls that succeed before the rest fail.
    pub updates_before_failure: AtomicUsize,
    pub fail_updates: AtomicBool,
    /// When set, the next `update_task` call races with a concurrent edit
    /// of the same task.
    pub race_next_update: AtomicBool,
}

fn injected(op: &str) -> ScheduleError {
    ScheduleError::Io(std::io::Error::other(format!("injected {} failure", op)))
}

/// A JSON store that can be told to fail individual writes.
pub struct FlakyStore {
    inner: JsonStore,
    faults: Arc<Faults>,
}

impl FlakyStore {
    pub fn new(inner: JsonStore, faults: Arc<Faults>) -> Self {
        FlakyStore { inner, faults }
    }
}

impl Store for FlakyStore {
    fn tasks(&self, user: &UserId) -> Result<Vec<Task>> {
        self.inner.tasks(user)
    }

    fn task(&self, user: &UserId, id: TaskId) -> Result<Option<Task>> {
        self.inner.task(user, id)
    }

    fn insert_task(&self, task: Task) -> Result<Task> {
        self.inner.insert_task(task)
    }

    fn update_task(&self, task: &Task) -> Result<Task> {
        if self.faults.race_next_update.swap(false, Ordering::SeqCst) {
            if let Some(mut current) = self.inner.task(&task.user, task.id)? {
                current.title = format!("{} (edited)", current.title);
                self.inner.update_task(&current)?;
            }
        }
        if self.faults.fail_updates.load(Ordering::SeqCst) {
            let left = self.faults.updates_before_failure.load(Ordering::SeqCst);
            if left == 0 {
                return Err(injected("update"));
            }
            self.faults.updates_before_failure.store(left - 1, Ordering::SeqCst);
        }
        self.inner.update_task(task)
    }

    fn delete_task(&self, user: &UserId, id: TaskId) -> Result<bool> {
        if self.faults.fail_delete_task.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete_task(user, id)
    }

    fn templates(&self, user: &UserId) -> Result<Vec<RecurringTemplate>> {
        self.inner.templates(user)
    }

    fn template(&self, user: &UserId, id: TemplateId) -> Result<Option<RecurringTemplate>> {
        self.inner.template(user, id)
    }

    fn insert_template(&self, template: RecurringTemplate) -> Result<RecurringTemplate> {
        self.inner.insert_template(template)
    }

    fn delete_template(&self, user: &UserId, id: TemplateId) -> Result<bool> {
        self.inner.delete_template(user, id)
    }

    fn exceptions(&self, user: &UserId, from: NaiveDate, to: NaiveDate) -> Result<Vec<Exception>> {
        self.inner.exceptions(user, from, to)
    }

    fn exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>> {
        self.inner.exception(user, key)
    }

    fn insert_exception(&self, exception: Exception) -> Result<()> {
        if self.faults.fail_insert_exception.load(Ordering::SeqCst) {
            return Err(injected("exception insert"));
        }
        self.inner.insert_exception(exception)
    }

    fn delete_exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>> {
        self.inner.delete_exception(user, key)
    }

    fn columns(&self, user: &UserId) -> Result<ColumnSchema> {
        self.inner.columns(user)
    }

    fn save_columns(&self, schema: &ColumnSchema) -> Result<()> {
        self.inner.save_columns(schema)
    }
}

/// A planner over a fresh temporary data directory with a fixed clock.
pub struct Harness<Tz: TimeZone> {
    pub dir: TempDir,
    pub clock: Arc<FixedClock>,
    pub faults: Arc<Faults>,
    pub planner: Planner<Tz>,
    pub user: UserId,
}

pub fn harness<Tz: TimeZone>(tz: Tz, now: DateTime<Utc>) -> Harness<Tz> {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let faults = Arc::new(Faults::default());
    let store = FlakyStore::new(JsonStore::open(dir.path()).unwrap(), faults.clone());
    let planner = Planner::new(
        Box::new(store),
        Box::new(clock.clone()),
        tz,
        SchedulerSettings::default(),
    )
    .unwrap();
    Harness {
        dir,
        clock,
        faults,
        planner,
        user: UserId::new("alice"),
    }
}
