pub mod app;
pub mod ui;

use std::io;

use chrono::TimeZone;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use crate::models::UserId;
use crate::planner::Planner;
use app::{App, InputMode};
use ui::ui;

pub fn run_tui<Tz: TimeZone>(planner: &Planner<Tz>, user: &UserId) -> anyhow::Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(planner, user.clone());
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend, Tz: TimeZone>(terminal: &mut Terminal<B>, app: &mut App<'_, Tz>) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.input_mode {
                InputMode::Normal => match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Down | KeyCode::Char('j') => app.next(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous(),
                    KeyCode::Right | KeyCode::Char('n') => app.shift_week(1),
                    KeyCode::Left | KeyCode::Char('p') => app.shift_week(-1),
                    KeyCode::Char('t') => app.this_week(),
                    KeyCode::Char('x') => app.cancel_selected(),
                    KeyCode::Char('r') => app.start_reschedule(),
                    KeyCode::Char('u') => app.undo_selected(),
                    KeyCode::Char('s') => app.auto_schedule(),
                    KeyCode::Char(' ') => app.complete_selected(),
                    _ => {}
                },
                InputMode::Rescheduling => match key.code {
                    KeyCode::Enter => app.handle_input(),
                    KeyCode::Esc => {
                        app.input_mode = InputMode::Normal;
                        app.input_buffer.clear();
                    }
                    KeyCode::Char(c) => app.input_buffer.push(c),
                    KeyCode::Backspace => {
                        app.input_buffer.pop();
                    }
                    _ => {}
                },
            }
        }
    }
}
