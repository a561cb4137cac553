use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use ratatui::widgets::TableState;

use crate::localtime::local_date;
use crate::models::{Occurrence, OccurrenceKind, Status, TimeOfDay, UserId};
use crate::planner::Planner;

#[derive(PartialEq)]
pub enum InputMode {
    Normal,
    Rescheduling,
}

/// State of the weekly agenda.
pub struct App<'a, Tz: TimeZone> {
    pub planner: &'a Planner<Tz>,
    pub user: UserId,
    /// Monday of the week on screen.
    pub week_start: NaiveDate,
    pub occurrences: Vec<Occurrence>,
    pub state: TableState,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub message: Option<String>,
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

impl<'a, Tz: TimeZone> App<'a, Tz> {
    pub fn new(planner: &'a Planner<Tz>, user: UserId) -> Self {
        let today = local_date(planner.tz(), planner.now());
        let mut app = App {
            planner,
            user,
            week_start: monday_of(today),
            occurrences: Vec::new(),
            state: TableState::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            message: None,
        };
        app.reload();
        app
    }

    pub fn week_end(&self) -> NaiveDate {
        self.week_start + Duration::days(6)
    }

    /// Reloads the week from storage, keeping the selection in range.
    pub fn reload(&mut self) {
        match self.planner.schedule(&self.user, self.week_start, self.week_end()) {
            Ok(mut occurrences) => {
                occurrences.sort_by_key(|o| o.start);
                self.occurrences = occurrences;
            }
            Err(e) => {
                self.occurrences.clear();
                self.message = Some(format!("Error: {}", e));
            }
        }

        if self.occurrences.is_empty() {
            self.state.select(None);
        } else if let Some(i) = self.state.selected() {
            if i >= self.occurrences.len() {
                self.state.select(Some(self.occurrences.len() - 1));
            }
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn selected(&self) -> Option<&Occurrence> {
        self.state.selected().and_then(|i| self.occurrences.get(i))
    }

    pub fn next(&mut self) {
        if self.occurrences.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.occurrences.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.occurrences.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.occurrences.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn shift_week(&mut self, weeks: i64) {
        self.week_start += Duration::weeks(weeks);
        self.state.select(None);
        self.reload();
    }

    pub fn this_week(&mut self) {
        self.week_start = monday_of(local_date(self.planner.tz(), self.planner.now()));
        self.state.select(None);
        self.reload();
    }

    fn report<T>(&mut self, result: crate::Result<T>, ok: impl FnOnce(T) -> String) {
        self.message = Some(match result {
            Ok(value) => ok(value),
            Err(e) => format!("Error: {}", e),
        });
        self.reload();
    }

    /// Cancels the selected weekly occurrence.
    pub fn cancel_selected(&mut self) {
        let Some(key) = self.selected().and_then(Occurrence::weekly_key) else {
            self.message = Some("Only recurring occurrences can be cancelled.".into());
            return;
        };
        let result = self.planner.cancel_occurrence(&self.user, key.template_id, key.date);
        self.report(result, |_| format!("Cancelled {}.", key));
    }

    pub fn start_reschedule(&mut self) {
        match self.selected() {
            Some(o) if o.is_weekly() && o.exception.is_none() => {
                let start = o.start.with_timezone(self.planner.tz()).naive_local();
                self.input_buffer = start.format("%Y-%m-%d %H:%M").to_string();
                self.input_mode = InputMode::Rescheduling;
            }
            _ => self.message = Some("Select an active recurring occurrence to move.".into()),
        }
    }

    pub fn handle_input(&mut self) {
        if self.input_mode == InputMode::Rescheduling {
            self.finish_reschedule();
        }
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
    }

    fn finish_reschedule(&mut self) {
        let Some(key) = self.selected().and_then(Occurrence::weekly_key) else {
            return;
        };
        let target = match NaiveDateTime::parse_from_str(self.input_buffer.trim(), "%Y-%m-%d %H:%M") {
            Ok(t) => t,
            Err(_) => {
                self.message = Some("Use YYYY-MM-DD HH:MM.".into());
                return;
            }
        };
        let time = match TimeOfDay::new(target.hour() as u8, target.minute() as u8) {
            Ok(t) => t,
            Err(e) => {
                self.message = Some(format!("Error: {}", e));
                return;
            }
        };
        let result = self
            .planner
            .reschedule_occurrence(&self.user, key.template_id, key.date, target.date(), time);
        self.report(result, |outcome| match outcome.new_task {
            Some(task) => format!("Moved {} to {} (task {}).", key, target.format("%a %H:%M"), task.id),
            None => format!("Moved {}.", key),
        });
    }

    /// Removes the exception on the selected weekly occurrence.
    pub fn undo_selected(&mut self) {
        let key = match self.selected() {
            Some(o) if o.exception.is_some() => o.weekly_key(),
            _ => None,
        };
        let Some(key) = key else {
            self.message = Some("Nothing to undo here.".into());
            return;
        };
        let result = self.planner.undo_exception(&self.user, key.template_id, key.date, None);
        self.report(result, |_| format!("Restored {}.", key));
    }

    /// Marks the selected task as completed.
    pub fn complete_selected(&mut self) {
        let Some(OccurrenceKind::Normal { task_id }) = self.selected().map(|o| o.kind) else {
            return;
        };
        let result = self.planner.set_status(&self.user, task_id, Status::Completed);
        self.report(result, |t| format!("Completed '{}'.", t.title));
    }

    pub fn auto_schedule(&mut self) {
        let result = self.planner.auto_schedule(&self.user);
        self.report(result, |report| {
            let mut msg = format!("Scheduled {} task(s).", report.scheduled_count());
            let missing = report.unscheduled_titles();
            if !missing.is_empty() {
                msg.push_str(&format!(" No slot for: {}.", missing.join(", ")));
            }
            msg
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SchedulerSettings;
    use crate::models::{DayOfWeek, ExceptionKind, TemplateDraft};
    use crate::storage::JsonStore;
    use chrono::Utc;

    fn planner(dir: &std::path::Path) -> Planner<Utc> {
        let store = JsonStore::open(dir).unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 21, 8, 0, 0).unwrap());
        Planner::new(Box::new(store), Box::new(clock), Utc, SchedulerSettings::default()).unwrap()
    }

    #[test]
    fn opens_on_current_week_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let planner = planner(dir.path());
        let user = UserId::new("sam");
        planner
            .add_template(
                &user,
                TemplateDraft {
                    title: "Standup".into(),
                    day: DayOfWeek::Monday,
                    time: TimeOfDay::new(9, 0).unwrap(),
                    duration_minutes: 30,
                    task_type: "Work".into(),
                },
            )
            .unwrap();

        let mut app = App::new(&planner, user);
        assert_eq!(app.week_start, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(app.occurrences.len(), 1);

        app.cancel_selected();
        assert_eq!(app.occurrences[0].exception, Some(ExceptionKind::Cancelled));
        app.undo_selected();
        assert_eq!(app.occurrences[0].exception, None);

        app.shift_week(1);
        assert_eq!(app.week_start, NaiveDate::from_ymd_opt(2026, 10, 26).unwrap());
        assert_eq!(app.occurrences.len(), 1);
    }
}
