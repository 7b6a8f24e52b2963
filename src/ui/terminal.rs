use crate::config::UiConfig;
use crate::events::TuiEvent;
use crate::session::SessionController;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::{Context, Result};
use crossterm::{
    event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture, EventStream},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Animation cadence for the pending indicator
const TICK_RATE: Duration = Duration::from_millis(300);

/// Run the interactive conversation UI until the user quits
pub async fn run(session: Arc<SessionController>, ui: &UiConfig) -> Result<()> {
    install_panic_hook();
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, session.clone(), ui).await;
    if session.cancel() {
        info!("cancelled in-flight request on exit");
    }
    restore_terminal()?;
    terminal.show_cursor().context("Failed to show cursor")?;
    result
}

async fn event_loop(terminal: &mut Tui, session: Arc<SessionController>, ui: &UiConfig) -> Result<()> {
    let (tx, mut app_events) = mpsc::unbounded_channel();
    let mut snapshots = session.subscribe();
    let mut manager = ConversationManager::new(session, tx, ui.placeholder.clone(), ui.show_timestamps);
    let mut terminal_events = EventStream::new();
    let mut tick = tokio::time::interval(TICK_RATE);

    loop {
        terminal
            .draw(|frame| frame.render_widget(&manager, frame.size()))
            .context("Failed to draw frame")?;

        tokio::select! {
            maybe_event = terminal_events.next() => match maybe_event {
                Some(Ok(event)) => {
                    let Some(event) = TuiEvent::from_crossterm(event) else { continue };
                    match event {
                        TuiEvent::Key(key) => {
                            if manager.handle_key(key) == ConversationAction::Exit {
                                break;
                            }
                        }
                        TuiEvent::Mouse(mouse) => manager.handle_mouse(mouse),
                        TuiEvent::Paste(text) => manager.handle_paste(&text),
                        TuiEvent::Resize => {}
                    }
                }
                Some(Err(err)) => return Err(err).context("Failed to read terminal event"),
                None => break,
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                manager.apply_snapshot(&snapshot);
            }
            Some(event) = app_events.recv() => {
                if manager.handle_app_event(event) == ConversationAction::Exit {
                    break;
                }
            }
            _ = tick.tick() => manager.tick(),
        }
    }

    Ok(())
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)
        .context("Failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    Ok(())
}

/// Leave the alternate screen before the default hook prints the panic
fn install_panic_hook() {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        original(info);
    }));
}
