//! Greedy first-fit placement of pending and delayed tasks around the
//! week's fixed commitments.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SchedulerSettings;
use crate::error::{Result, ScheduleError};
use crate::localtime::{local_date, local_naive, round_up};
use crate::models::{Status, Task, TaskId, UserId};
use crate::occurrence::{materialize, next_day};
use crate::priority::sort_by_score;
use crate::storage::{Store, TaskFilter};

pub type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Half-open overlap test: intervals that only touch do not overlap.
pub fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && a_end > b_start
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Placement {
    pub task_id: TaskId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Unplaced {
    pub task_id: TaskId,
    pub title: String,
}

/// What one auto-schedule run did.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    /// Tasks moved to Delay by the reconcile step before placement.
    pub delayed: Vec<TaskId>,
    /// Placements, in the order they were made.
    pub scheduled: Vec<Placement>,
    /// Tasks with no free slot inside the horizon. They keep their status.
    pub unscheduled: Vec<Unplaced>,
    /// Tasks changed by someone else while this run was placing them.
    pub skipped: Vec<TaskId>,
}

impl ScheduleReport {
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    pub fn unscheduled_titles(&self) -> Vec<&str> {
        self.unscheduled.iter().map(|u| u.title.as_str()).collect()
    }
}

/// Moves every open task whose deadline has passed to Delay. Returns the
/// ids that changed.
pub fn reconcile_delays(store: &dyn Store, user: &UserId, now: DateTime<Utc>) -> Result<Vec<TaskId>> {
    let mut changed = Vec::new();
    for mut task in store.tasks(user)? {
        if !task.is_overdue(now) {
            continue;
        }
        task.status = Status::Delay;
        match store.update_task(&task) {
            Ok(_) => changed.push(task.id),
            Err(ScheduleError::Conflict(reason)) => {
                warn!(task = task.id, %reason, "skipping delay transition");
            }
            Err(e) => return Err(e),
        }
    }
    if !changed.is_empty() {
        info!(user = %user, count = changed.len(), "marked overdue tasks as delayed");
    }
    Ok(changed)
}

/// Intervals the scheduler must not overlap: weekly occurrences inside the
/// horizon that are not cancelled, and scheduled or running tasks that have
/// not ended yet.
pub fn busy_intervals<Tz: TimeZone>(
    store: &dyn Store,
    tz: &Tz,
    settings: &SchedulerSettings,
    user: &UserId,
    now: DateTime<Utc>,
) -> Result<Vec<Interval>> {
    // A task may start just before the horizon and run into the next day.
    let last_day = next_day(local_date(tz, now + settings.horizon()));
    let mut busy: Vec<Interval> = materialize(store, tz, user, local_date(tz, now), last_day)?
        .into_iter()
        .filter(|o| o.is_weekly() && o.is_busy())
        .map(|o| (o.start, o.end))
        .collect();
    let running = TaskFilter::with_status(&[Status::Scheduled, Status::InProgress]);
    busy.extend(
        store
            .tasks_matching(user, &running)?
            .iter()
            .filter_map(Task::interval)
            .filter(|(_, end)| *end > now),
    );
    Ok(busy)
}

/// First start time, scanning forward from `now` in fixed steps, at which a
/// task of `duration` fits without overlapping `busy`. Start times inside
/// the sleep window are never returned.
pub fn find_slot<Tz: TimeZone>(
    tz: &Tz,
    settings: &SchedulerSettings,
    now: DateTime<Utc>,
    duration: Duration,
    busy: &[Interval],
) -> Option<DateTime<Utc>> {
    let window = settings.day_window();
    let horizon = now + settings.horizon();
    let step = Duration::minutes(i64::from(settings.step_minutes));
    let mut scanner = round_up(tz, now, settings.step_minutes);

    for _ in 0..settings.max_steps() {
        if scanner >= horizon {
            return None;
        }
        if !window.is_awake(local_naive(tz, scanner).hour()) {
            scanner = window.next_opening(tz, scanner);
            continue;
        }
        let end = scanner + duration;
        if !busy.iter().any(|(s, e)| overlaps(scanner, end, *s, *e)) {
            return Some(scanner);
        }
        scanner += step;
    }
    None
}

/// Places every Pending and Delay task of `user`, highest score first.
///
/// Each placement is persisted as soon as it is found and becomes busy time
/// for the tasks after it. A write failure after at least one placement is
/// reported as `PartialBatchFailure`; earlier placements stay.
pub fn auto_schedule<Tz: TimeZone>(
    store: &dyn Store,
    tz: &Tz,
    settings: &SchedulerSettings,
    user: &UserId,
    now: DateTime<Utc>,
) -> Result<ScheduleReport> {
    let mut report = ScheduleReport {
        delayed: reconcile_delays(store, user, now)?,
        ..Default::default()
    };

    let mut queue = store.tasks_matching(user, &TaskFilter::with_status(&[Status::Pending, Status::Delay]))?;
    queue.sort_by_key(|t| t.id);
    sort_by_score(&mut queue);

    let mut busy = busy_intervals(store, tz, settings, user, now)?;
    debug!(user = %user, queued = queue.len(), busy = busy.len(), "starting auto-schedule");

    for mut task in queue {
        let Some(start) = find_slot(tz, settings, now, task.duration(), &busy) else {
            warn!(task = task.id, title = %task.title, "no free slot within the planning horizon");
            report.unscheduled.push(Unplaced {
                task_id: task.id,
                title: task.title.clone(),
            });
            continue;
        };
        task.schedule_at(start);
        match store.update_task(&task) {
            Ok(saved) => {
                let (start, end) = saved.interval().unwrap_or((start, start + saved.duration()));
                busy.push((start, end));
                report.scheduled.push(Placement {
                    task_id: saved.id,
                    title: saved.title,
                    start,
                    end,
                });
            }
            Err(ScheduleError::Conflict(reason)) => {
                warn!(task = task.id, %reason, "task changed during auto-schedule, skipping");
                report.skipped.push(task.id);
            }
            Err(e) if report.scheduled.is_empty() => return Err(e),
            Err(e) => {
                return Err(ScheduleError::PartialBatchFailure {
                    placed: report.scheduled.iter().map(|p| p.task_id).collect(),
                    failed: task.id,
                    source: Box::new(e),
                })
            }
        }
    }

    info!(
        user = %user,
        scheduled = report.scheduled.len(),
        unscheduled = report.unscheduled.len(),
        "auto-schedule finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, d, h, mi, 0).unwrap()
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!overlaps(utc(19, 9, 0), utc(19, 10, 0), utc(19, 10, 0), utc(19, 11, 0)));
        assert!(overlaps(utc(19, 9, 0), utc(19, 10, 1), utc(19, 10, 0), utc(19, 11, 0)));
    }

    #[test]
    fn slot_search_skips_busy_time() {
        let settings = SchedulerSettings::default();
        let busy = vec![(utc(19, 8, 0), utc(19, 9, 0))];
        let slot = find_slot(&Utc, &settings, utc(19, 8, 0), Duration::minutes(30), &busy);
        assert_eq!(slot, Some(utc(19, 9, 0)));
    }

    #[test]
    fn slot_search_jumps_over_the_night() {
        let settings = SchedulerSettings::default();
        let slot = find_slot(&Utc, &settings, utc(19, 23, 10), Duration::minutes(30), &[]);
        assert_eq!(slot, Some(utc(20, 7, 0)));

        let slot = find_slot(&Utc, &settings, utc(19, 3, 0), Duration::minutes(30), &[]);
        assert_eq!(slot, Some(utc(19, 7, 0)));
    }

    #[test]
    fn exhausted_horizon_gives_no_slot() {
        let settings = SchedulerSettings::default();
        let busy = vec![(utc(1, 0, 0), utc(31, 0, 0))];
        assert_eq!(find_slot(&Utc, &settings, utc(19, 8, 0), Duration::minutes(30), &busy), None);
    }
}
