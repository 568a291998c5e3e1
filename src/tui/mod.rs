//! Terminal User Interface
//!
//! Ratatui front end for the onboarding wizard.

pub mod app;
pub mod events;
pub mod onboarding;
pub mod onboarding_render;

use std::io;

use anyhow::Result;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

pub use app::App;
pub use events::{EventHandler, TuiEvent};

/// Run the app until the user closes or finishes the wizard.
///
/// Puts the terminal in raw/alternate-screen mode and restores it on every
/// exit path, including panics.
pub async fn run(mut app: App) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        original_hook(info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_loop(&mut terminal, &mut app).await;
    app.shutdown().await;

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    app.initialize().await?;
    EventHandler::start_terminal_listener(app.event_sender());

    while !app.should_quit {
        terminal.draw(|f| app.render(f))?;

        let Some(event) = app.next_event().await else {
            break;
        };
        app.handle_event(event).await?;

        // Drain whatever queued up meanwhile before the next draw
        while !app.should_quit
            && let Some(event) = app.try_next_event()
        {
            app.handle_event(event).await?;
        }
    }

    Ok(())
}
