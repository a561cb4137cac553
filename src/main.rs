use std::io;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate, TimeZone};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use weekwise::clock::SystemClock;
use weekwise::commands::*;
use weekwise::config::Config;
use weekwise::localtime::parse_local_datetime;
use weekwise::models::{
    DayOfWeek, FieldKind, Priority, Status, SuitableTime, TaskId, TemplateDraft, TemplateId,
    TimeOfDay, UserId,
};
use weekwise::planner::{NewTask, TaskPatch};
use weekwise::storage::JsonStore;
use weekwise::tui::run_tui;
use weekwise::Planner;

/// Environment variable holding the log filter, e.g. `weekwise=debug`.
const LOG_ENV: &str = "WEEKWISE_LOG";

#[derive(Parser)]
#[command(name = "weekwise")]
#[command(about = "Weekly planner with recurring commitments and auto-scheduling", long_about = None)]
struct Cli {
    /// Act on behalf of this user
    #[arg(short, long, global = true)]
    user: Option<String>,
    /// Path to config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task title (quoted if it has spaces)
        title: String,
        /// Duration in minutes
        #[arg(short, long, default_value_t = 60)]
        minutes: u32,
        /// Low, medium, high or urgent
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Deadline as YYYY-MM-DD [HH:MM] local time
        #[arg(short, long)]
        deadline: Option<String>,
        /// Category shown in the schedule
        #[arg(short = 't', long = "type")]
        task_type: Option<String>,
        /// Preferred time of day (informational)
        #[arg(short, long)]
        suitable: Option<SuitableTime>,
        /// Interest from 1 to 5
        #[arg(short, long)]
        interest: Option<u8>,
        /// Custom column value as key=value, repeatable
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },
    /// List tasks sorted by scheduling score
    List {
        /// Show completed and cancelled tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Edit a task
    Edit {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        minutes: Option<u32>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        deadline: Option<String>,
        #[arg(short = 't', long = "type")]
        task_type: Option<String>,
        #[arg(short, long)]
        suitable: Option<SuitableTime>,
        #[arg(short, long)]
        interest: Option<u8>,
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },
    /// Set the status of a task
    Status { id: TaskId, status: Status },
    /// Remove a task
    Remove { id: TaskId },
    /// Place a task at a fixed time, ignoring conflicts
    Move {
        id: TaskId,
        /// New start as YYYY-MM-DD HH:MM
        start: String,
        /// New end as YYYY-MM-DD HH:MM
        end: String,
    },
    /// Manage recurring templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Manage custom task columns
    Column {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Show the schedule between two dates (default: the next seven days)
    Schedule {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Cancel one occurrence of a recurring template
    Cancel { template: TemplateId, date: NaiveDate },
    /// Move one occurrence of a recurring template
    Reschedule {
        template: TemplateId,
        date: NaiveDate,
        new_date: NaiveDate,
        new_time: TimeOfDay,
    },
    /// Restore a cancelled or moved occurrence
    Undo {
        template: TemplateId,
        date: NaiveDate,
        /// Task created by the reschedule, if known
        #[arg(long)]
        task: Option<TaskId>,
    },
    /// Mark overdue tasks as Delay
    Reconcile,
    /// Place pending and delayed tasks into free slots
    Auto,
    /// Generate shell completions
    Completions { shell: Shell },
    /// Open interactive TUI
    Ui,
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Add a new template
    Add {
        title: String,
        #[arg(short, long)]
        day: DayOfWeek,
        /// Start time as HH:MM
        #[arg(short = 'T', long)]
        time: TimeOfDay,
        #[arg(short, long, default_value_t = 60)]
        minutes: u32,
        #[arg(short = 't', long = "type", default_value = "General")]
        task_type: String,
    },
    /// List templates
    List,
    /// Remove a template
    Remove { id: TemplateId },
    /// Review templates from a JSON file produced by a schedule extractor
    Import {
        path: PathBuf,
        /// Store the templates instead of only showing them
        #[arg(long)]
        commit: bool,
    },
}

#[derive(Subcommand)]
enum ColumnCommands {
    /// Add a custom column
    Add { key: String, kind: FieldKind },
    /// List custom columns
    List,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "weekwise", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let data_dir = config.data_dir();
    let store = JsonStore::open(&data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let user = config.user(cli.user.clone());

    match config.zone()? {
        Some(zone) => run(cli, &config, store, user, zone),
        None => run(cli, &config, store, user, Local),
    }
}

fn run<Tz: TimeZone>(cli: Cli, config: &Config, store: JsonStore, user: UserId, tz: Tz) -> anyhow::Result<()> {
    let planner = Planner::new(Box::new(store), Box::new(SystemClock), tz, config.scheduler)?;
    let out = if cli.json { Output::Json } else { Output::Table };
    let deadline = |s: Option<String>| s.map(|s| parse_local_datetime(planner.tz(), &s)).transpose();

    match cli.command {
        Some(Commands::Add { title, minutes, priority, deadline: due, task_type, suitable, interest, fields }) => {
            let new = NewTask {
                title,
                duration_minutes: minutes,
                priority,
                deadline: deadline(due)?,
                task_type,
                suitable_time: suitable,
                interest,
                fields,
            };
            cmd_add(&planner, &user, new, out)?;
        }
        Some(Commands::List { all }) => cmd_list(&planner, &user, all, out)?,
        Some(Commands::Edit { id, title, minutes, priority, deadline: due, task_type, suitable, interest, fields }) => {
            let patch = TaskPatch {
                title,
                duration_minutes: minutes,
                priority,
                deadline: deadline(due)?,
                task_type,
                suitable_time: suitable,
                interest,
                fields,
            };
            cmd_edit(&planner, &user, id, patch, out)?;
        }
        Some(Commands::Status { id, status }) => {
            cmd_status(&planner, &user, id, status, out)?;
        }
        Some(Commands::Remove { id }) => cmd_remove(&planner, &user, id, out)?,
        Some(Commands::Move { id, start, end }) => {
            let start = parse_local_datetime(planner.tz(), &start)?;
            let end = parse_local_datetime(planner.tz(), &end)?;
            cmd_move(&planner, &user, id, start, end, out)?;
        }
        Some(Commands::Template { command }) => match command {
            TemplateCommands::Add { title, day, time, minutes, task_type } => {
                let draft = TemplateDraft {
                    title,
                    day,
                    time,
                    duration_minutes: minutes,
                    task_type,
                };
                cmd_template_add(&planner, &user, draft, out)?;
            }
            TemplateCommands::List => cmd_template_list(&planner, &user, out)?,
            TemplateCommands::Remove { id } => cmd_template_remove(&planner, &user, id, out)?,
            TemplateCommands::Import { path, commit } => {
                cmd_template_import(&planner, &user, &path, commit, out)?;
            }
        },
        Some(Commands::Column { command }) => match command {
            ColumnCommands::Add { key, kind } => cmd_column_add(&planner, &user, &key, kind, out)?,
            ColumnCommands::List => cmd_column_list(&planner, &user, out)?,
        },
        Some(Commands::Schedule { from, to }) => {
            cmd_schedule(&planner, &user, from, to, out)?;
        }
        Some(Commands::Cancel { template, date }) => cmd_cancel(&planner, &user, template, date, out)?,
        Some(Commands::Reschedule { template, date, new_date, new_time }) => {
            cmd_reschedule(&planner, &user, template, date, new_date, new_time, out)?;
        }
        Some(Commands::Undo { template, date, task }) => {
            cmd_undo(&planner, &user, template, date, task, out)?;
        }
        Some(Commands::Reconcile) => {
            cmd_reconcile(&planner, &user, out)?;
        }
        Some(Commands::Auto) => {
            cmd_auto(&planner, &user, out)?;
        }
        Some(Commands::Completions { .. }) => {}
        Some(Commands::Ui) | None => run_tui(&planner, &user).context("error running TUI")?,
    }
    Ok(())
}
