use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::autoschedule::ScheduleReport;
use crate::error::Result;
use crate::localtime::{local_date, local_naive};
use crate::models::{
    ExceptionKind, FieldKind, Occurrence, OccurrenceKind, Status, Task, TaskId, TemplateDraft,
    TemplateId, TimeOfDay, UserId,
};
use crate::planner::{read_template_drafts, NewTask, Planner, TaskPatch};
use crate::priority::compute_score;

/// How a command reports its result on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Table,
    Json,
    Silent,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn say(out: Output, message: impl AsRef<str>) {
    if out == Output::Table {
        println!("{}", message.as_ref());
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn local<Tz: TimeZone>(planner: &Planner<Tz>, instant: DateTime<Utc>) -> String {
    local_naive(planner.tz(), instant).format("%a %Y-%m-%d %H:%M").to_string()
}

fn local_time<Tz: TimeZone>(planner: &Planner<Tz>, instant: DateTime<Utc>) -> String {
    local_naive(planner.tz(), instant).format("%H:%M").to_string()
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Delay => Color::Red,
        Status::Scheduled | Status::InProgress => Color::Cyan,
        Status::Completed => Color::Green,
        Status::Cancelled => Color::Grey,
        Status::Pending => Color::Yellow,
    }
}

/// Adds a new task to the database.
pub fn cmd_add<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, new: NewTask, out: Output) -> Result<Task> {
    let task = planner.add_task(user, new)?;
    match out {
        Output::Json => print_json(&task)?,
        _ => say(out, format!("Task added (id = {})", task.id)),
    }
    Ok(task)
}

/// Lists tasks in a formatted table, highest scheduling score first.
///
/// By default, hides completed and cancelled tasks unless `all` is true.
pub fn cmd_list<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, all: bool, out: Output) -> Result<()> {
    let mut tasks = planner.tasks(user)?;
    if !all {
        tasks.retain(Task::is_open);
    }
    tasks.sort_by_key(|t| std::cmp::Reverse(compute_score(t)));

    if out == Output::Json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        say(out, "No tasks found.");
        return Ok(());
    }

    let now = planner.now();
    let mut table = new_table();
    table.set_header(header(&[
        "ID", "Title", "Priority", "Type", "Min", "Deadline", "Start", "Score", "Status",
    ]));
    for t in &tasks {
        let deadline = match t.deadline {
            Some(d) => {
                let cell = Cell::new(local(planner, d));
                if d < now && t.is_open() {
                    cell.fg(Color::Red)
                } else {
                    cell
                }
            }
            None => Cell::new("-"),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(&t.title),
            Cell::new(t.priority),
            Cell::new(&t.task_type),
            Cell::new(t.duration_minutes),
            deadline,
            Cell::new(t.start_time.map(|s| local(planner, s)).unwrap_or_else(|| "-".into())),
            Cell::new(compute_score(t)),
            Cell::new(t.status).fg(status_color(t.status)),
        ]);
    }
    say(out, table.to_string());
    Ok(())
}

/// Edits an existing task's details.
pub fn cmd_edit<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    id: TaskId,
    patch: TaskPatch,
    out: Output,
) -> Result<Task> {
    let task = planner.edit_task(user, id, patch)?;
    match out {
        Output::Json => print_json(&task)?,
        _ => say(out, format!("Task {} updated.", id)),
    }
    Ok(task)
}

pub fn cmd_status<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    id: TaskId,
    status: Status,
    out: Output,
) -> Result<Task> {
    let task = planner.set_status(user, id, status)?;
    match out {
        Output::Json => print_json(&task)?,
        _ => say(out, format!("Task {} is now {}.", id, task.status)),
    }
    Ok(task)
}

/// Removes a task from the database by ID.
pub fn cmd_remove<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, id: TaskId, out: Output) -> Result<()> {
    planner.remove_task(user, id)?;
    match out {
        Output::Json => print_json(&serde_json::json!({ "ok": true })),
        _ => {
            say(out, format!("Task {} removed.", id));
            Ok(())
        }
    }
}

/// Moves a task to a new interval without consulting the scheduler.
pub fn cmd_move<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    id: TaskId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    out: Output,
) -> Result<Task> {
    let task = planner.move_task(user, id, start, end)?;
    match out {
        Output::Json => print_json(&task)?,
        _ => say(
            out,
            format!("Task {} moved to {} - {}.", id, local(planner, start), local_time(planner, end)),
        ),
    }
    Ok(task)
}

/// Adds a new recurring template.
pub fn cmd_template_add<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    draft: TemplateDraft,
    out: Output,
) -> Result<TemplateId> {
    let template = planner.add_template(user, draft)?;
    match out {
        Output::Json => print_json(&template)?,
        _ => say(
            out,
            format!(
                "Template '{}' added (id = {}), every {} at {}.",
                template.title, template.id, template.day, template.time
            ),
        ),
    }
    Ok(template.id)
}

/// Lists all recurring templates.
pub fn cmd_template_list<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, out: Output) -> Result<()> {
    let templates = planner.templates(user)?;
    if out == Output::Json {
        return print_json(&templates);
    }
    if templates.is_empty() {
        say(out, "No templates found.");
        return Ok(());
    }
    let mut table = new_table();
    table.set_header(header(&["ID", "Title", "Day", "Time", "Min", "Type", "Source"]));
    for t in templates {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.title),
            Cell::new(t.day),
            Cell::new(t.time),
            Cell::new(t.duration_minutes),
            Cell::new(t.task_type),
            Cell::new(t.source),
        ]);
    }
    say(out, table.to_string());
    Ok(())
}

/// Removes a template. Exceptions recorded for it are kept.
pub fn cmd_template_remove<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    id: TemplateId,
    out: Output,
) -> Result<()> {
    planner.remove_template(user, id)?;
    say(out, format!("Template {} removed.", id));
    Ok(())
}

/// Shows templates extracted by an external tool for review; stores them
/// only with `commit`.
pub fn cmd_template_import<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    path: &Path,
    commit: bool,
    out: Output,
) -> Result<usize> {
    let drafts = read_template_drafts(path)?;
    let templates = planner.import_templates(user, drafts, commit)?;
    if out == Output::Json {
        print_json(&templates)?;
        return Ok(templates.len());
    }
    let mut table = new_table();
    table.set_header(header(&["Title", "Day", "Time", "Min", "Type"]));
    for t in &templates {
        table.add_row(vec![
            Cell::new(&t.title),
            Cell::new(t.day),
            Cell::new(t.time),
            Cell::new(t.duration_minutes),
            Cell::new(&t.task_type),
        ]);
    }
    say(out, table.to_string());
    if commit {
        say(out, format!("Imported {} template(s).", templates.len()));
    } else {
        say(out, "Review only. Run again with --commit to save these templates.");
    }
    Ok(templates.len())
}

pub fn cmd_column_add<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    key: &str,
    kind: FieldKind,
    out: Output,
) -> Result<()> {
    planner.add_column(user, key, kind)?;
    say(out, format!("Column '{}' ({}) added.", key.trim(), kind));
    Ok(())
}

pub fn cmd_column_list<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, out: Output) -> Result<()> {
    let schema = planner.columns(user)?;
    if out == Output::Json {
        return print_json(&schema.columns);
    }
    if schema.columns.is_empty() {
        say(out, "No columns defined.");
        return Ok(());
    }
    let mut table = new_table();
    table.set_header(header(&["Column", "Kind"]));
    for c in schema.columns {
        table.add_row(vec![Cell::new(c.key), Cell::new(c.kind)]);
    }
    say(out, table.to_string());
    Ok(())
}

fn occurrence_ref(o: &Occurrence) -> String {
    match o.kind {
        OccurrenceKind::Weekly { key } => format!("template {}", key.template_id),
        OccurrenceKind::Normal { task_id } => format!("task {}", task_id),
    }
}

/// Prints the merged schedule between two local dates. Without dates the
/// current week (today plus six days) is shown.
pub fn cmd_schedule<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    out: Output,
) -> Result<Vec<Occurrence>> {
    let start = from.unwrap_or_else(|| local_date(planner.tz(), planner.now()));
    let end = to.unwrap_or(start + Duration::days(6));
    let mut occurrences = planner.schedule(user, start, end)?;
    occurrences.sort_by_key(|o| o.start);

    if out == Output::Json {
        print_json(&occurrences)?;
        return Ok(occurrences);
    }
    if occurrences.is_empty() {
        say(out, format!("Nothing scheduled between {} and {}.", start, end));
        return Ok(occurrences);
    }
    let mut table = new_table();
    table.set_header(header(&["Date", "Start", "End", "Title", "Type", "Ref", "State"]));
    for o in &occurrences {
        let state = match o.exception {
            Some(ExceptionKind::Cancelled) => Cell::new("cancelled").fg(Color::Grey),
            Some(ExceptionKind::Rescheduled) => Cell::new("moved").fg(Color::Grey),
            None if o.fixed => Cell::new("fixed"),
            None => Cell::new("task").fg(Color::Cyan),
        };
        let title = if o.cancelled {
            Cell::new(&o.title).add_attribute(Attribute::CrossedOut)
        } else {
            Cell::new(&o.title)
        };
        table.add_row(vec![
            Cell::new(local_date(planner.tz(), o.start).format("%a %Y-%m-%d")),
            Cell::new(local_time(planner, o.start)),
            Cell::new(local_time(planner, o.end)),
            title,
            Cell::new(&o.task_type),
            Cell::new(occurrence_ref(o)),
            state,
        ]);
    }
    say(out, table.to_string());
    Ok(occurrences)
}

pub fn cmd_cancel<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    template_id: TemplateId,
    date: NaiveDate,
    out: Output,
) -> Result<()> {
    let outcome = planner.cancel_occurrence(user, template_id, date)?;
    match out {
        Output::Json => print_json(&outcome),
        _ => {
            say(out, format!("Occurrence of template {} on {} cancelled.", template_id, date));
            Ok(())
        }
    }
}

pub fn cmd_reschedule<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    template_id: TemplateId,
    date: NaiveDate,
    new_date: NaiveDate,
    new_time: TimeOfDay,
    out: Output,
) -> Result<Option<TaskId>> {
    let outcome = planner.reschedule_occurrence(user, template_id, date, new_date, new_time)?;
    let task_id = outcome.new_task.as_ref().map(|t| t.id);
    match out {
        Output::Json => print_json(&outcome)?,
        _ => say(
            out,
            format!(
                "Occurrence of template {} on {} moved to {} {} (task {}).",
                template_id,
                date,
                new_date,
                new_time,
                task_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into())
            ),
        ),
    }
    Ok(task_id)
}

pub fn cmd_undo<Tz: TimeZone>(
    planner: &Planner<Tz>,
    user: &UserId,
    template_id: TemplateId,
    date: NaiveDate,
    linked_task: Option<TaskId>,
    out: Output,
) -> Result<()> {
    let removed = planner.undo_exception(user, template_id, date, linked_task)?;
    match out {
        Output::Json => print_json(&removed),
        _ => {
            say(
                out,
                format!(
                    "Restored occurrence of template {} on {} ({} undone).",
                    template_id,
                    date,
                    removed.kind.to_string().to_lowercase()
                ),
            );
            Ok(())
        }
    }
}

pub fn cmd_reconcile<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, out: Output) -> Result<Vec<TaskId>> {
    let delayed = planner.reconcile_delays(user)?;
    match out {
        Output::Json => print_json(&delayed)?,
        _ if delayed.is_empty() => say(out, "No overdue tasks."),
        _ => say(out, format!("{} task(s) marked as Delay.", delayed.len())),
    }
    Ok(delayed)
}

/// Runs the auto-scheduler and prints what it placed and what did not fit.
pub fn cmd_auto<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId, out: Output) -> Result<ScheduleReport> {
    let report = planner.auto_schedule(user)?;
    if out == Output::Json {
        print_json(&serde_json::json!({
            "scheduledCount": report.scheduled_count(),
            "unscheduledTitles": report.unscheduled_titles(),
            "report": &report,
        }))?;
        return Ok(report);
    }

    if !report.delayed.is_empty() {
        say(out, format!("{} overdue task(s) marked as Delay.", report.delayed.len()));
    }
    if report.scheduled.is_empty() {
        say(out, "No tasks were scheduled.");
    } else {
        let mut table = new_table();
        table.set_header(header(&["ID", "Title", "Start", "End"]));
        for p in &report.scheduled {
            table.add_row(vec![
                Cell::new(p.task_id),
                Cell::new(&p.title),
                Cell::new(local(planner, p.start)),
                Cell::new(local_time(planner, p.end)),
            ]);
        }
        say(out, table.to_string());
    }
    for title in report.unscheduled_titles() {
        say(out, format!("Could not fit '{}' in the next {} days.", title, planner.settings().horizon_days));
    }
    for id in &report.skipped {
        say(out, format!("Task {} changed while scheduling; run again to place it.", id));
    }
    Ok(report)
}
