use crate::error::ErrorKind;
use crate::session::SubmitOutcome;

/// Internal application events for coordinating between components
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A background submit settled
    SubmitSettled { outcome: SubmitOutcome },

    /// A submit was refused; the text goes back into the composer
    SubmitRejected { text: String, kind: ErrorKind },
}

/// Terminal events the UI reacts to
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Mouse event
    Mouse(crossterm::event::MouseEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize,
}

impl TuiEvent {
    /// Map a crossterm event, dropping the kinds the UI ignores
    pub fn from_crossterm(event: crossterm::event::Event) -> Option<Self> {
        use crossterm::event::Event;
        match event {
            Event::Key(key) => Some(TuiEvent::Key(key)),
            Event::Mouse(mouse) => Some(TuiEvent::Mouse(mouse)),
            Event::Paste(text) => Some(TuiEvent::Paste(text)),
            Event::Resize(..) => Some(TuiEvent::Resize),
            Event::FocusGained | Event::FocusLost => None,
        }
    }
}
