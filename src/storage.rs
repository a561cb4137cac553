use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, ScheduleError};
use crate::models::{
    ColumnSchema, DayOfWeek, Exception, OccurrenceKey, RecurringTemplate, Status, Task, TaskId,
    TemplateId, UserId,
};

/// Selects a user's tasks by status and by where their start time falls.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub statuses: Option<Vec<Status>>,
    pub exclude: Vec<Status>,
    /// Half-open `[from, to)` window the start time must fall in.
    pub starts_within: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TaskFilter {
    pub fn with_status(statuses: &[Status]) -> Self {
        TaskFilter {
            statuses: Some(statuses.to_vec()),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, status: Status) -> Self {
        self.exclude.push(status);
        self
    }

    pub fn starting_within(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.starts_within = Some((from, to));
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if self.exclude.contains(&task.status) {
            return false;
        }
        if let Some((from, to)) = self.starts_within {
            match task.start_time {
                Some(start) if start >= from && start < to => {}
                _ => return false,
            }
        }
        true
    }
}

/// Persistence for tasks, recurring templates, exceptions and column
/// schemas. Every read is scoped to one user.
pub trait Store: Send + Sync {
    fn tasks(&self, user: &UserId) -> Result<Vec<Task>>;

    fn task(&self, user: &UserId, id: TaskId) -> Result<Option<Task>>;

    /// Stores a new task, assigning its id. The `id` and `revision` of the
    /// argument are ignored.
    fn insert_task(&self, task: Task) -> Result<Task>;

    /// Replaces a task. Fails with `Conflict` when the stored revision
    /// differs from `task.revision`; returns the task with its new revision.
    fn update_task(&self, task: &Task) -> Result<Task>;

    fn delete_task(&self, user: &UserId, id: TaskId) -> Result<bool>;

    fn templates(&self, user: &UserId) -> Result<Vec<RecurringTemplate>>;

    fn template(&self, user: &UserId, id: TemplateId) -> Result<Option<RecurringTemplate>>;

    fn insert_template(&self, template: RecurringTemplate) -> Result<RecurringTemplate>;

    fn delete_template(&self, user: &UserId, id: TemplateId) -> Result<bool>;

    /// Exceptions whose date falls in the inclusive range `[from, to]`.
    fn exceptions(&self, user: &UserId, from: NaiveDate, to: NaiveDate) -> Result<Vec<Exception>>;

    fn exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>>;

    /// Fails with `Conflict` if an exception already exists for the key.
    fn insert_exception(&self, exception: Exception) -> Result<()>;

    fn delete_exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>>;

    fn columns(&self, user: &UserId) -> Result<ColumnSchema>;

    fn save_columns(&self, schema: &ColumnSchema) -> Result<()>;

    fn tasks_matching(&self, user: &UserId, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut tasks = self.tasks(user)?;
        tasks.retain(|t| filter.matches(t));
        Ok(tasks)
    }

    fn templates_on(&self, user: &UserId, day: DayOfWeek) -> Result<Vec<RecurringTemplate>> {
        let mut templates = self.templates(user)?;
        templates.retain(|t| t.day == day);
        Ok(templates)
    }
}

const TASKS_FILE: &str = "tasks.json";
const TEMPLATES_FILE: &str = "templates.json";
const EXCEPTIONS_FILE: &str = "exceptions.json";
const COLUMNS_FILE: &str = "columns.json";

/// Stores every record kind as a pretty-printed JSON array in its own file
/// under one data directory, shared by all users.
pub struct JsonStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<JsonStore> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(JsonStore {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Loads a whole file. A missing file is an empty collection.
    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let content = match fs::read_to_string(self.path(file)) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites a file through a temporary sibling so readers never see a
    /// half-written array.
    fn save<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let path = self.path(file);
        let tmp = self.path(&format!("{}.tmp", file));
        let s = serde_json::to_string_pretty(items)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(s.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Store for JsonStore {
    fn tasks(&self, user: &UserId) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.load(TASKS_FILE)?;
        tasks.retain(|t| &t.user == user);
        Ok(tasks)
    }

    fn task(&self, user: &UserId, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks(user)?.into_iter().find(|t| t.id == id))
    }

    fn insert_task(&self, mut task: Task) -> Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks: Vec<Task> = self.load(TASKS_FILE)?;
        task.id = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        task.revision = 0;
        tasks.push(task.clone());
        self.save(TASKS_FILE, &tasks)?;
        Ok(task)
    }

    fn update_task(&self, task: &Task) -> Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks: Vec<Task> = self.load(TASKS_FILE)?;
        let stored = tasks
            .iter_mut()
            .find(|t| t.id == task.id && t.user == task.user)
            .ok_or_else(|| ScheduleError::not_found("task", task.id))?;
        if stored.revision != task.revision {
            return Err(ScheduleError::Conflict(format!(
                "task {} was modified concurrently (revision {} != {})",
                task.id, stored.revision, task.revision
            )));
        }
        *stored = task.clone();
        stored.revision += 1;
        let updated = stored.clone();
        self.save(TASKS_FILE, &tasks)?;
        Ok(updated)
    }

    fn delete_task(&self, user: &UserId, id: TaskId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut tasks: Vec<Task> = self.load(TASKS_FILE)?;
        let len_before = tasks.len();
        tasks.retain(|t| !(t.id == id && &t.user == user));
        if tasks.len() == len_before {
            return Ok(false);
        }
        self.save(TASKS_FILE, &tasks)?;
        Ok(true)
    }

    fn templates(&self, user: &UserId) -> Result<Vec<RecurringTemplate>> {
        let mut templates: Vec<RecurringTemplate> = self.load(TEMPLATES_FILE)?;
        templates.retain(|t| &t.user == user);
        Ok(templates)
    }

    fn template(&self, user: &UserId, id: TemplateId) -> Result<Option<RecurringTemplate>> {
        Ok(self.templates(user)?.into_iter().find(|t| t.id == id))
    }

    fn insert_template(&self, mut template: RecurringTemplate) -> Result<RecurringTemplate> {
        let _guard = self.write_lock.lock();
        let mut templates: Vec<RecurringTemplate> = self.load(TEMPLATES_FILE)?;
        template.id = templates.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        templates.push(template.clone());
        self.save(TEMPLATES_FILE, &templates)?;
        Ok(template)
    }

    fn delete_template(&self, user: &UserId, id: TemplateId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut templates: Vec<RecurringTemplate> = self.load(TEMPLATES_FILE)?;
        let len_before = templates.len();
        templates.retain(|t| !(t.id == id && &t.user == user));
        if templates.len() == len_before {
            return Ok(false);
        }
        self.save(TEMPLATES_FILE, &templates)?;
        Ok(true)
    }

    fn exceptions(&self, user: &UserId, from: NaiveDate, to: NaiveDate) -> Result<Vec<Exception>> {
        let mut exceptions: Vec<Exception> = self.load(EXCEPTIONS_FILE)?;
        exceptions.retain(|e| &e.user == user && e.key.date >= from && e.key.date <= to);
        Ok(exceptions)
    }

    fn exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>> {
        let exceptions: Vec<Exception> = self.load(EXCEPTIONS_FILE)?;
        Ok(exceptions
            .into_iter()
            .find(|e| &e.user == user && e.key == key))
    }

    fn insert_exception(&self, exception: Exception) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut exceptions: Vec<Exception> = self.load(EXCEPTIONS_FILE)?;
        if exceptions
            .iter()
            .any(|e| e.user == exception.user && e.key == exception.key)
        {
            return Err(ScheduleError::Conflict(format!(
                "occurrence {} already has an exception",
                exception.key
            )));
        }
        exceptions.push(exception);
        self.save(EXCEPTIONS_FILE, &exceptions)
    }

    fn delete_exception(&self, user: &UserId, key: OccurrenceKey) -> Result<Option<Exception>> {
        let _guard = self.write_lock.lock();
        let mut exceptions: Vec<Exception> = self.load(EXCEPTIONS_FILE)?;
        let Some(pos) = exceptions
            .iter()
            .position(|e| &e.user == user && e.key == key)
        else {
            return Ok(None);
        };
        let removed = exceptions.remove(pos);
        self.save(EXCEPTIONS_FILE, &exceptions)?;
        Ok(Some(removed))
    }

    fn columns(&self, user: &UserId) -> Result<ColumnSchema> {
        let schemas: Vec<ColumnSchema> = self.load(COLUMNS_FILE)?;
        Ok(schemas
            .into_iter()
            .find(|s| &s.user == user)
            .unwrap_or_else(|| ColumnSchema::empty(user.clone())))
    }

    fn save_columns(&self, schema: &ColumnSchema) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut schemas: Vec<ColumnSchema> = self.load(COLUMNS_FILE)?;
        match schemas.iter_mut().find(|s| s.user == schema.user) {
            Some(s) => *s = schema.clone(),
            None => schemas.push(schema.clone()),
        }
        self.save(COLUMNS_FILE, &schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExceptionKind;

    fn store() -> (JsonStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (JsonStore::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn tasks_are_scoped_per_user() {
        let (store, _dir) = store();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let a = store.insert_task(Task::new(alice.clone(), "A", 30)).unwrap();
        let b = store.insert_task(Task::new(bob.clone(), "B", 30)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.tasks(&alice).unwrap().len(), 1);
        assert!(store.task(&alice, b.id).unwrap().is_none());
        assert!(!store.delete_task(&alice, b.id).unwrap());
    }

    #[test]
    fn stale_revision_is_rejected() {
        let (store, _dir) = store();
        let user = UserId::new("u");
        let task = store.insert_task(Task::new(user, "Write", 30)).unwrap();

        let mut first = task.clone();
        first.title = "Write more".into();
        let first = store.update_task(&first).unwrap();
        assert_eq!(first.revision, 1);

        let mut second = task;
        second.title = "Write less".into();
        assert!(matches!(
            store.update_task(&second),
            Err(ScheduleError::Conflict(_))
        ));
    }

    #[test]
    fn duplicate_exception_is_a_conflict() {
        let (store, _dir) = store();
        let user = UserId::new("u");
        let key = OccurrenceKey::new(1, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        let exception = Exception {
            user: user.clone(),
            key,
            kind: ExceptionKind::Cancelled,
            linked_task: None,
            created_at: Utc::now(),
        };
        store.insert_exception(exception.clone()).unwrap();
        assert!(matches!(
            store.insert_exception(exception),
            Err(ScheduleError::Conflict(_))
        ));
        assert!(store.delete_exception(&user, key).unwrap().is_some());
        assert!(store.delete_exception(&user, key).unwrap().is_none());
    }

    #[test]
    fn templates_by_weekday() {
        use crate::models::{TemplateDraft, TemplateSource};
        let (store, _dir) = store();
        let user = UserId::new("u");
        for (title, day) in [("Gym", DayOfWeek::Monday), ("Choir", DayOfWeek::Thursday)] {
            let draft = TemplateDraft {
                title: title.into(),
                day,
                time: "18:00".parse().unwrap(),
                duration_minutes: 60,
                task_type: "Personal".into(),
            };
            store
                .insert_template(draft.into_template(user.clone(), TemplateSource::Manual))
                .unwrap();
        }
        let thursday = store.templates_on(&user, DayOfWeek::Thursday).unwrap();
        assert_eq!(thursday.len(), 1);
        assert_eq!(thursday[0].title, "Choir");
        assert_eq!(thursday[0].id, 2);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let (store, _dir) = store();
        fs::write(store.root().join(TASKS_FILE), "{ not json").unwrap();
        assert!(matches!(
            store.tasks(&UserId::new("u")),
            Err(ScheduleError::Serde(_))
        ));
    }
}
