//! # Weekwise
//!
//! A personal planner that fits one-off tasks around a weekly routine.
//! Weekwise combines a CLI for quick entry with a TUI agenda for moving
//! through the week.
//!
//! ## Concepts
//!
//! *   **Tasks**: dated pieces of work with a priority, a duration and an
//!     optional deadline.
//! *   **Recurring templates**: weekly commitments ("Monday 09:00, 60 min")
//!     with no concrete date.
//! *   **Exceptions**: a single occurrence of a template can be cancelled or
//!     moved without touching the template. Undo restores it.
//! *   **Auto-schedule**: pending and overdue tasks are placed greedily into
//!     the first free half hour of the next five days, never during the
//!     night (23:00 to 07:00 local time).
//!
//! ## Usage
//!
//! ```bash
//! # A weekly commitment
//! weekwise template add "Standup" --day monday --time 09:00 --minutes 30
//!
//! # A task with a deadline
//! weekwise add "Write report" --minutes 90 --priority high --deadline "2026-10-23 17:00"
//!
//! # Place everything that is pending
//! weekwise auto
//!
//! # Look at the week, then skip one standup
//! weekwise schedule
//! weekwise cancel 1 2026-10-19
//! weekwise undo 1 2026-10-19
//! ```
//!
//! ## Data Storage
//!
//! Records are saved as JSON in your local data directory:
//! *   Linux: `~/.local/share/weekwise/`
//! *   macOS: `~/Library/Application Support/weekwise/`
//! *   Windows: `%APPDATA%\weekwise\`
//!
//! You can override this by setting the `WEEKWISE_DB` environment variable.
//!
//! ## Scheduling Order
//!
//! Tasks are placed by score:
//! 1.  **Delay**: tasks past their deadline come first.
//! 2.  **Priority**: Urgent, then High, Medium and Low.

pub mod autoschedule;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod exceptions;
pub mod localtime;
pub mod models;
pub mod occurrence;
pub mod planner;
pub mod priority;
pub mod storage;
pub mod tui;

pub use error::{Result, ScheduleError};
pub use planner::Planner;
