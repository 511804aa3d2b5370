//! Terminal user interface.
//!
//! The display boundary of the dashboard: it consumes rectangular row
//! matrices per tab per refresh and emits discrete user actions back to the
//! scheduler.
//!
//! ```text
//!  ┌───────────────────────────────────────────────────────────────┐
//!  │ 1 Interfaces │ 2 Nodes │ 3 Errors │ 4 Memory │ 5 Threads      │
//!  ├───────────────────────────────────────────────────────────────┤
//!  │ fastpath version: 22.02-release                               │
//!  ├───────────────────────────────────────────────────────────────┤
//!  │ Name   Idx  State  MTU(...)   RxCounters  RxCount  ...        │
//!  │ eth0   1    up     9000/...   Packets     1200     ...        │
//!  │ ...                                                           │
//!  ├───────────────────────────────────────────────────────────────┤
//!  │ Tab/1-5 switch  ↑/↓ scroll  s sort [RxBytes]  c clear  q quit │
//!  └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row updates arrive over an mpsc channel from the scheduler; user actions
//! leave over another. The loop never blocks on either: the scheduler keeps
//! polling whether or not the display drains promptly, and stale rows stay
//! visible across failed polls.

mod app;
mod ui;

pub use app::{App, AppState, InputEvent, TabView};

use crate::dashboard::{Action, TabRows};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::mpsc;

/// Redraw cadence of the terminal loop.
const TICK_RATE: Duration = Duration::from_millis(250);

/// Run the terminal UI until the user quits.
///
/// Emits [`Action::Exit`] before returning so the scheduler can wind down
/// its tasks and release the connection.
pub async fn run_tui(
    mut app: App,
    mut updates: mpsc::Receiver<TabRows>,
    actions: mpsc::Sender<Action>,
) -> anyhow::Result<()> {
    // Restore the terminal even when a draw panics.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        let _ = io::stdout().flush();
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut last_tick = std::time::Instant::now();

    // Apply anything already queued so the first draw is not empty.
    while let Ok(update) = updates.try_recv() {
        app.set_rows(update.tab, update.rows);
    }

    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match InputEvent::from_key(key.code) {
                        InputEvent::Quit => {
                            let _ = actions.try_send(Action::Exit);
                            app.quit();
                        }
                        InputEvent::NextTab => {
                            app.next_tab();
                            let _ = actions.try_send(Action::SwitchTab(app.active_tab));
                        }
                        InputEvent::PrevTab => {
                            app.prev_tab();
                            let _ = actions.try_send(Action::SwitchTab(app.active_tab));
                        }
                        InputEvent::SelectTab(tab) => {
                            app.select_tab(tab);
                            let _ = actions.try_send(Action::SwitchTab(tab));
                        }
                        InputEvent::ScrollUp => app.scroll_by(-1),
                        InputEvent::ScrollDown => app.scroll_by(1),
                        InputEvent::PageUp => app.scroll_by(-10),
                        InputEvent::PageDown => app.scroll_by(10),
                        InputEvent::SortPrev => app.sort_cursor_prev(),
                        InputEvent::SortNext => app.sort_cursor_next(),
                        InputEvent::SortApply => {
                            if let Some(field) = app.sort_field() {
                                let _ = actions.try_send(Action::Sort {
                                    tab: app.active_tab,
                                    field,
                                });
                            }
                        }
                        InputEvent::Clear => {
                            if app.active_tab.clearable() {
                                let _ = actions.try_send(Action::Clear(app.active_tab));
                            }
                        }
                        InputEvent::Refresh => terminal.clear()?,
                        InputEvent::Unknown => {}
                    }
                }
            }
        }

        while let Ok(update) = updates.try_recv() {
            app.set_rows(update.tab, update.rows);
        }

        if last_tick.elapsed() >= TICK_RATE {
            last_tick = std::time::Instant::now();
        }

        if app.should_quit() {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    let _ = io::stdout().flush();

    Ok(())
}
