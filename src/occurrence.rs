//! Expands recurring templates and their exceptions over a date range and
//! merges them with dated one-off tasks.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone};
use tracing::debug;

use crate::error::{Result, ScheduleError};
use crate::localtime::{resolve, start_of_day};
use crate::models::{
    ExceptionKind, Occurrence, OccurrenceKey, OccurrenceKind, RecurringTemplate, Status, Task,
    UserId,
};
use crate::storage::{Store, TaskFilter};

/// Longest range, in days, a single query may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

pub(crate) fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

/// Every occurrence between `start` and `end` (both inclusive, local
/// calendar dates). Weekly occurrences come first, by date; tasks follow in
/// stored order. Cancelled and rescheduled occurrences are included with
/// `cancelled` set.
pub fn materialize<Tz: TimeZone>(
    store: &dyn Store,
    tz: &Tz,
    user: &UserId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Occurrence>> {
    if end < start {
        return Err(ScheduleError::InvalidInput(format!(
            "range end {} is before start {}",
            end, start
        )));
    }
    if (end - start).num_days() >= MAX_RANGE_DAYS {
        return Err(ScheduleError::InvalidInput(format!(
            "range {}..{} exceeds {} days",
            start, end, MAX_RANGE_DAYS
        )));
    }

    let templates = store.templates(user)?;
    let exceptions: HashMap<OccurrenceKey, ExceptionKind> = store
        .exceptions(user, start, end)?
        .into_iter()
        .map(|e| (e.key, e.kind))
        .collect();
    let filter = TaskFilter::default()
        .excluding(Status::Cancelled)
        .starting_within(start_of_day(tz, start), start_of_day(tz, next_day(end)));
    let tasks = store.tasks_matching(user, &filter)?;

    let mut occurrences = Vec::new();
    for date in start.iter_days().take_while(|d| *d <= end) {
        for template in templates.iter().filter(|t| t.occurs_on(date)) {
            let key = OccurrenceKey::new(template.id, date);
            occurrences.push(weekly_occurrence(
                tz,
                template,
                date,
                exceptions.get(&key).copied(),
            ));
        }
    }
    let weekly = occurrences.len();
    occurrences.extend(tasks.iter().filter_map(task_occurrence));

    debug!(
        user = %user,
        %start,
        %end,
        weekly,
        normal = occurrences.len() - weekly,
        "materialized schedule"
    );
    Ok(occurrences)
}

/// The occurrence of `template` on `date`. An occurrence that would run
/// past midnight is cut off at the end of its day.
pub fn weekly_occurrence<Tz: TimeZone>(
    tz: &Tz,
    template: &RecurringTemplate,
    date: NaiveDate,
    exception: Option<ExceptionKind>,
) -> Occurrence {
    let start = resolve(tz, date, template.time.to_naive());
    let day_end = start_of_day(tz, next_day(date));
    let end = (start + template.duration()).min(day_end);
    Occurrence {
        kind: OccurrenceKind::Weekly {
            key: OccurrenceKey::new(template.id, date),
        },
        title: template.title.clone(),
        task_type: template.task_type.clone(),
        start,
        end,
        fixed: true,
        cancelled: exception.is_some(),
        exception,
    }
}

/// A dated task as an occurrence. Tasks without a start time have none.
pub fn task_occurrence(task: &Task) -> Option<Occurrence> {
    let (start, end) = task.interval()?;
    Some(Occurrence {
        kind: OccurrenceKind::Normal { task_id: task.id },
        title: task.title.clone(),
        task_type: task.task_type.clone(),
        start,
        end,
        fixed: false,
        cancelled: false,
        exception: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOfWeek, Exception, TemplateSource, TimeOfDay};
    use crate::storage::JsonStore;
    use chrono::{DateTime, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn template(store: &JsonStore, user: &UserId, day: DayOfWeek, time: &str, minutes: u32) -> RecurringTemplate {
        store
            .insert_template(RecurringTemplate {
                id: 0,
                user: user.clone(),
                title: "Standup".into(),
                day,
                time: time.parse::<TimeOfDay>().unwrap(),
                duration_minutes: minutes,
                task_type: "Work".into(),
                source: TemplateSource::Manual,
                created_at: Utc::now(),
            })
            .unwrap()
    }

    #[test]
    fn weekly_template_expands_on_matching_dates() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let user = UserId::new("u");
        template(&store, &user, DayOfWeek::Monday, "09:00", 60);

        // 2026-10-19 is a Monday.
        let occ = materialize(&store, &Utc, &user, date(2026, 10, 19), date(2026, 11, 1)).unwrap();
        assert_eq!(occ.len(), 2);
        assert_eq!(occ[0].start, utc(2026, 10, 19, 9, 0));
        assert_eq!(occ[0].end, utc(2026, 10, 19, 10, 0));
        assert_eq!(occ[1].start, utc(2026, 10, 26, 9, 0));
        assert!(occ.iter().all(|o| o.fixed && !o.cancelled));
    }

    #[test]
    fn exception_marks_occurrence_cancelled_but_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let user = UserId::new("u");
        let t = template(&store, &user, DayOfWeek::Monday, "09:00", 60);
        store
            .insert_exception(Exception {
                user: user.clone(),
                key: OccurrenceKey::new(t.id, date(2026, 10, 19)),
                kind: ExceptionKind::Cancelled,
                linked_task: None,
                created_at: Utc::now(),
            })
            .unwrap();

        let occ = materialize(&store, &Utc, &user, date(2026, 10, 19), date(2026, 10, 26)).unwrap();
        assert_eq!(occ.len(), 2);
        assert!(occ[0].cancelled);
        assert_eq!(occ[0].exception, Some(ExceptionKind::Cancelled));
        assert!(!occ[0].is_busy());
        assert!(!occ[1].cancelled);
    }

    #[test]
    fn late_occurrence_ends_at_midnight() {
        let t = RecurringTemplate {
            id: 1,
            user: UserId::new("u"),
            title: "Late shift".into(),
            day: DayOfWeek::Friday,
            time: "23:00".parse().unwrap(),
            duration_minutes: 120,
            task_type: "Work".into(),
            source: TemplateSource::Manual,
            created_at: Utc::now(),
        };
        let occ = weekly_occurrence(&Utc, &t, date(2026, 10, 23), None);
        assert_eq!(occ.end, utc(2026, 10, 24, 0, 0));
    }

    #[test]
    fn rejects_inverted_and_oversized_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let user = UserId::new("u");
        assert!(materialize(&store, &Utc, &user, date(2026, 10, 20), date(2026, 10, 19)).is_err());
        assert!(materialize(&store, &Utc, &user, date(2026, 1, 1), date(2027, 6, 1)).is_err());
    }
}
